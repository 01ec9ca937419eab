//! Indexed documents.
//!
//! A document is the unit of ingestion: text loaded from a file or supplied
//! directly, which is then chunked, embedded, and mined for entities.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{content_hash, current_timestamp};
use crate::io::find_char_boundary;

/// A text document known to the retrieval index.
///
/// # Examples
///
/// ```
/// use ardharag::core::Document;
///
/// let doc = Document::from_named("notes".to_string(), "Hello, world!".to_string());
/// assert_eq!(doc.size(), 13);
/// assert_eq!(doc.display_name(), "notes");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (assigned by storage layer).
    pub id: Option<i64>,

    /// Optional name for the document; unique when set.
    pub name: Option<String>,

    /// Source file path (if loaded from file).
    pub source: Option<PathBuf>,

    /// Document content.
    pub content: String,

    /// Document metadata.
    pub metadata: DocumentMetadata,
}

/// Metadata associated with a document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Content type or file extension (e.g., "txt", "md").
    pub content_type: Option<String>,

    /// Unix timestamp when the document was created.
    pub created_at: i64,

    /// Unix timestamp when the document was last modified.
    pub updated_at: i64,

    /// Total size in bytes.
    pub size: usize,

    /// Line count (computed on demand).
    pub line_count: Option<usize>,

    /// Number of chunks (set after chunking).
    pub chunk_count: Option<usize>,

    /// Hash of the content, used to skip re-ingesting identical text.
    pub content_hash: Option<String>,
}

impl Document {
    /// Creates an unnamed document from content.
    #[must_use]
    pub fn from_content(content: String) -> Self {
        let size = content.len();
        let now = current_timestamp();
        Self {
            id: None,
            name: None,
            source: None,
            content,
            metadata: DocumentMetadata {
                size,
                created_at: now,
                updated_at: now,
                ..Default::default()
            },
        }
    }

    /// Creates a document from a file path and its content.
    ///
    /// The file name becomes the document name and the extension its
    /// content type.
    ///
    /// # Examples
    ///
    /// ```
    /// use ardharag::core::Document;
    /// use std::path::PathBuf;
    ///
    /// let doc = Document::from_file(PathBuf::from("docs/guide.md"), "# Guide".to_string());
    /// assert_eq!(doc.name.as_deref(), Some("guide.md"));
    /// assert_eq!(doc.metadata.content_type.as_deref(), Some("md"));
    /// ```
    #[must_use]
    pub fn from_file(path: PathBuf, content: String) -> Self {
        let content_type = infer_content_type(&path);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToString::to_string);

        let mut doc = Self::from_content(content);
        doc.name = name;
        doc.source = Some(path);
        doc.metadata.content_type = content_type;
        doc
    }

    /// Creates a named document from content.
    #[must_use]
    pub fn from_named(name: String, content: String) -> Self {
        let mut doc = Self::from_content(content);
        doc.name = Some(name);
        doc
    }

    /// Returns the size of the document in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Checks if the document is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns the line count, caching it in the metadata.
    pub fn line_count(&mut self) -> usize {
        if let Some(count) = self.metadata.line_count {
            return count;
        }
        let count = self.content.lines().count();
        self.metadata.line_count = Some(count);
        count
    }

    /// Returns a byte slice of the content, or `None` if the range is
    /// invalid or splits a character.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Option<&str> {
        if start <= end && end <= self.content.len() {
            self.content.get(start..end)
        } else {
            None
        }
    }

    /// Returns up to `len` bytes from the start, on a character boundary.
    #[must_use]
    pub fn peek(&self, len: usize) -> &str {
        let end = find_char_boundary(&self.content, len.min(self.content.len()));
        &self.content[..end]
    }

    /// Returns the display name for this document.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        if let Some(name) = self
            .source
            .as_ref()
            .and_then(|path| path.file_name())
            .and_then(|n| n.to_str())
        {
            return name.to_string();
        }
        self.id
            .map_or_else(|| "unnamed".to_string(), |id| format!("document-{id}"))
    }

    /// Sets the chunk count after chunking.
    pub fn set_chunk_count(&mut self, count: usize) {
        self.metadata.chunk_count = Some(count);
        self.metadata.updated_at = current_timestamp();
    }

    /// Computes and sets the content hash.
    pub fn compute_hash(&mut self) {
        self.metadata.content_hash = Some(content_hash(&self.content));
    }
}

fn infer_content_type(path: &std::path::Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_content() {
        let doc = Document::from_content("Hello, world!".to_string());
        assert!(doc.id.is_none());
        assert!(doc.source.is_none());
        assert_eq!(doc.size(), 13);
        assert_eq!(doc.metadata.size, 13);
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_document_from_file() {
        let doc = Document::from_file(PathBuf::from("Report.TXT"), "content".to_string());
        assert_eq!(doc.source, Some(PathBuf::from("Report.TXT")));
        assert_eq!(doc.metadata.content_type, Some("txt".to_string()));
        assert_eq!(doc.name, Some("Report.TXT".to_string()));
    }

    #[test]
    fn test_document_slice_and_peek() {
        let doc = Document::from_content("Hello, 世界".to_string());
        assert_eq!(doc.slice(0, 5), Some("Hello"));
        assert_eq!(doc.slice(0, 100), None);
        assert_eq!(doc.slice(8, 9), None);
        assert_eq!(doc.peek(8), "Hello, ");
        assert_eq!(doc.peek(100), "Hello, 世界");
    }

    #[test]
    fn test_document_line_count_cached() {
        let mut doc = Document::from_content("a\nb\nc".to_string());
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.metadata.line_count, Some(3));
    }

    #[test]
    fn test_document_display_name() {
        let named = Document::from_named("named".to_string(), String::new());
        assert_eq!(named.display_name(), "named");

        let mut from_path = Document::from_content(String::new());
        from_path.source = Some(PathBuf::from("/data/manual.md"));
        assert_eq!(from_path.display_name(), "manual.md");

        let mut with_id = Document::from_content(String::new());
        with_id.id = Some(7);
        assert_eq!(with_id.display_name(), "document-7");

        assert_eq!(Document::from_content(String::new()).display_name(), "unnamed");
    }

    #[test]
    fn test_document_hash_is_content_based() {
        let mut a = Document::from_named("a".to_string(), "same".to_string());
        let mut b = Document::from_named("b".to_string(), "same".to_string());
        a.compute_hash();
        b.compute_hash();
        assert!(a.metadata.content_hash.is_some());
        assert_eq!(a.metadata.content_hash, b.metadata.content_hash);
    }

    #[test]
    fn test_document_serialization() {
        let doc = Document::from_named("test".to_string(), "content".to_string());
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
