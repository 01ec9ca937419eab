//! Unicode helpers shared by chunking, entity extraction and context
//! packing.

use unicode_segmentation::UnicodeSegmentation;

/// Finds a valid UTF-8 character boundary at or before the given position.
///
/// # Examples
///
/// ```
/// use ardharag::io::find_char_boundary;
///
/// let s = "Hello 世界";
/// assert_eq!(find_char_boundary(s, 6), 6); // Before '世'
/// assert_eq!(find_char_boundary(s, 7), 6); // Middle of '世', backs up
/// ```
#[must_use]
pub const fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    // Continuation bytes look like 10xxxxxx
    while boundary > 0 && (bytes[boundary] & 0xC0) == 0x80 {
        boundary -= 1;
    }
    boundary
}

/// Finds a valid UTF-8 character boundary at or after the given position.
#[must_use]
pub const fn find_char_boundary_forward(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut boundary = pos;
    while boundary < bytes.len() && (bytes[boundary] & 0xC0) == 0x80 {
        boundary += 1;
    }
    boundary
}

/// Splits text into trimmed, non-empty sentences using Unicode sentence
/// boundaries.
///
/// # Examples
///
/// ```
/// use ardharag::io::split_sentences;
///
/// let sentences = split_sentences("Rust is fast. Is it safe? Yes!");
/// assert_eq!(sentences, vec!["Rust is fast.", "Is it safe?", "Yes!"]);
/// ```
#[must_use]
pub fn split_sentences(s: &str) -> Vec<&str> {
    sentence_spans(s).into_iter().map(|(_, sentence)| sentence).collect()
}

/// Like [`split_sentences`], but also returns each sentence's byte offset.
#[must_use]
pub fn sentence_spans(s: &str) -> Vec<(usize, &str)> {
    s.split_sentence_bound_indices()
        .filter_map(|(offset, raw)| {
            let leading = raw.len() - raw.trim_start().len();
            let sentence = raw.trim();
            (!sentence.is_empty()).then_some((offset + leading, sentence))
        })
        .collect()
}

/// Collapses every run of whitespace into a single space and trims the ends.
#[must_use]
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_bytes`, preferring the last word boundary.
///
/// Falls back to a plain character boundary when no whitespace occurs in the
/// second half of the allowed prefix.
#[must_use]
pub fn truncate_at_word(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = find_char_boundary(s, max_bytes);
    let prefix = &s[..end];
    match prefix.rfind(char::is_whitespace) {
        Some(ws) if ws >= end / 2 => prefix[..ws].trim_end(),
        _ => prefix,
    }
}
