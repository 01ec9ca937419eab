//! Conversation session state.
//!
//! The session remembers which documents have been ingested and a bounded
//! history of query turns. The context manager reads recent turns to favour
//! documents the conversation is already about.

use serde::{Deserialize, Serialize};

use super::current_timestamp;

/// Persistent conversation state.
///
/// # Examples
///
/// ```
/// use ardharag::core::Session;
///
/// let mut session = Session::new();
/// session.record_turn("what is RRF?", vec![3, 4], vec![1], 8);
/// assert_eq!(session.turn_count(), 1);
/// assert_eq!(session.recent_documents(2), vec![1]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Query turns, oldest first.
    pub turns: Vec<Turn>,

    /// Documents ingested during this session.
    pub document_ids: Vec<i64>,

    /// Session metadata.
    pub metadata: SessionMetadata,
}

/// One query and the context it was answered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The query text.
    pub query: String,

    /// Chunks placed in the context window.
    pub chunk_ids: Vec<i64>,

    /// Documents those chunks came from.
    pub document_ids: Vec<i64>,

    /// Unix timestamp of the turn.
    pub timestamp: i64,
}

/// Metadata associated with a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Unix timestamp when the session was created.
    pub created_at: i64,

    /// Unix timestamp when the session was last modified.
    pub updated_at: i64,

    /// Schema version for migration support.
    pub version: u32,
}

impl Session {
    /// Creates an empty session stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        let now = current_timestamp();
        Self {
            turns: Vec::new(),
            document_ids: Vec::new(),
            metadata: SessionMetadata {
                created_at: now,
                updated_at: now,
                version: 1,
            },
        }
    }

    /// Appends a turn, dropping the oldest turns beyond `max_turns`.
    pub fn record_turn(
        &mut self,
        query: &str,
        chunk_ids: Vec<i64>,
        document_ids: Vec<i64>,
        max_turns: usize,
    ) {
        self.turns.push(Turn {
            query: query.to_string(),
            chunk_ids,
            document_ids,
            timestamp: current_timestamp(),
        });
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
        self.touch();
    }

    /// Returns the distinct documents referenced by the last `turns` turns,
    /// most recent first.
    #[must_use]
    pub fn recent_documents(&self, turns: usize) -> Vec<i64> {
        let mut seen = Vec::new();
        for turn in self.turns.iter().rev().take(turns) {
            for id in &turn.document_ids {
                if !seen.contains(id) {
                    seen.push(*id);
                }
            }
        }
        seen
    }

    /// Returns the most recent turn.
    #[must_use]
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns the number of recorded turns.
    #[must_use]
    pub const fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Forgets all turns while keeping the document list.
    pub fn clear_history(&mut self) {
        self.turns.clear();
        self.touch();
    }

    /// Registers an ingested document.
    pub fn add_document(&mut self, document_id: i64) {
        if !self.document_ids.contains(&document_id) {
            self.document_ids.push(document_id);
            self.touch();
        }
    }

    /// Removes a document from the session, including from past turns.
    ///
    /// Returns `true` if the document was registered.
    pub fn remove_document(&mut self, document_id: i64) -> bool {
        let before = self.document_ids.len();
        self.document_ids.retain(|&id| id != document_id);
        for turn in &mut self.turns {
            turn.document_ids.retain(|&id| id != document_id);
        }
        let removed = self.document_ids.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    fn touch(&mut self) {
        self.metadata.updated_at = current_timestamp();
    }
}
