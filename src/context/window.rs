//! The assembled context window.

use std::fmt::Write;
use std::ops::Range;

use serde::Serialize;

/// A contiguous passage from one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSegment {
    /// Source document.
    pub document_id: i64,
    /// Display name of the source document.
    pub document_name: String,
    /// Chunks merged into this passage, in document order.
    pub chunk_ids: Vec<i64>,
    /// Index of the first chunk.
    pub first_index: usize,
    /// Index of the last chunk.
    pub last_index: usize,
    /// Byte range covered in the document.
    pub byte_range: Range<usize>,
    /// Passage text.
    pub content: String,
    /// Best relevance among the merged chunks.
    pub score: f64,
    /// Estimated tokens.
    pub tokens: usize,
    /// Whether the passage was cut to fit the budget.
    pub truncated: bool,
}

impl ContextSegment {
    /// Label used in rendered output, e.g. `guide.md (chunks 2-4)`.
    #[must_use]
    pub fn label(&self) -> String {
        if self.first_index == self.last_index {
            format!("{} (chunk {})", self.document_name, self.first_index)
        } else {
            format!(
                "{} (chunks {}-{})",
                self.document_name, self.first_index, self.last_index
            )
        }
    }
}

/// Attribution for one rendered passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// Citation number as rendered (`[n]`).
    pub number: usize,
    /// Source document.
    pub document_id: i64,
    /// Display name of the source document.
    pub document_name: String,
    /// Index of the first chunk.
    pub first_index: usize,
    /// Index of the last chunk.
    pub last_index: usize,
    /// Passage relevance.
    pub score: f64,
}

/// Passages selected for a query under a token budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextWindow {
    /// Passages in presentation order.
    pub segments: Vec<ContextSegment>,
    /// Budget the window was packed into.
    pub max_tokens: usize,
    /// Tokens used by the segments.
    pub used_tokens: usize,
    /// Tokens of every retrieved candidate before selection.
    pub candidate_tokens: usize,
    /// Candidates skipped because they did not fit.
    pub dropped: usize,
}

impl ContextWindow {
    /// An empty window for `max_tokens`.
    #[must_use]
    pub const fn empty(max_tokens: usize) -> Self {
        Self {
            segments: Vec::new(),
            max_tokens,
            used_tokens: 0,
            candidate_tokens: 0,
            dropped: 0,
        }
    }

    /// Whether no passage was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Tokens saved relative to sending every candidate.
    #[must_use]
    pub const fn savings(&self) -> usize {
        self.candidate_tokens.saturating_sub(self.used_tokens)
    }

    /// Every chunk in the window, in presentation order.
    #[must_use]
    pub fn chunk_ids(&self) -> Vec<i64> {
        self.segments
            .iter()
            .flat_map(|s| s.chunk_ids.iter().copied())
            .collect()
    }

    /// Distinct documents in the window, in presentation order.
    #[must_use]
    pub fn document_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = Vec::new();
        for segment in &self.segments {
            if !ids.contains(&segment.document_id) {
                ids.push(segment.document_id);
            }
        }
        ids
    }

    /// Numbered attributions matching [`ContextWindow::render`].
    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        self.segments
            .iter()
            .enumerate()
            .map(|(i, segment)| Source {
                number: i + 1,
                document_id: segment.document_id,
                document_name: segment.document_name.clone(),
                first_index: segment.first_index,
                last_index: segment.last_index,
                score: segment.score,
            })
            .collect()
    }

    /// Renders the passages as numbered blocks.
    ///
    /// ```text
    /// [1] guide.md (chunks 0-1)
    /// ...passage text...
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}] {}", i + 1, segment.label());
            out.push_str(segment.content.trim_end());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(document_id: i64, name: &str, indices: Range<usize>, content: &str) -> ContextSegment {
        ContextSegment {
            document_id,
            document_name: name.to_string(),
            chunk_ids: indices.clone().map(|i| i as i64 + 100).collect(),
            first_index: indices.start,
            last_index: indices.end - 1,
            byte_range: 0..content.len(),
            content: content.to_string(),
            score: 1.0,
            tokens: crate::core::estimate_tokens(content),
            truncated: false,
        }
    }

    fn window() -> ContextWindow {
        ContextWindow {
            segments: vec![
                segment(1, "guide.md", 0..2, "First passage.\n"),
                segment(2, "notes", 4..5, "Second passage."),
                segment(1, "guide.md", 7..8, "Third."),
            ],
            max_tokens: 100,
            used_tokens: 10,
            candidate_tokens: 40,
            dropped: 1,
        }
    }

    #[test]
    fn test_render_numbers_passages() {
        let rendered = window().render();
        assert_eq!(
            rendered,
            "[1] guide.md (chunks 0-1)\nFirst passage.\n\n[2] notes (chunk 4)\nSecond passage.\n\n[3] guide.md (chunk 7)\nThird.\n"
        );
    }

    #[test]
    fn test_sources_and_ids() {
        let window = window();
        let sources = window.sources();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[1].number, 2);
        assert_eq!(sources[1].document_name, "notes");
        assert_eq!(window.document_ids(), vec![1, 2]);
        assert_eq!(window.chunk_ids(), vec![100, 101, 104, 107]);
    }

    #[test]
    fn test_savings_and_empty() {
        assert_eq!(window().savings(), 30);
        let empty = ContextWindow::empty(50);
        assert!(empty.is_empty());
        assert_eq!(empty.savings(), 0);
        assert!(empty.render().is_empty());
    }
}
