//! File and text I/O.
//!
//! Provides file reading with memory mapping for large inputs, along with
//! the Unicode utilities used across the pipeline.

pub mod reader;
pub mod unicode;

pub use reader::{SourceFile, read_file, write_file};
pub use unicode::{
    find_char_boundary, find_char_boundary_forward, normalize_whitespace, sentence_spans,
    split_sentences, truncate_at_word,
};
