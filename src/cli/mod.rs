//! Command-line interface.
//!
//! Parses arguments with clap and runs commands against an index opened
//! through [`crate::ArdhaRag`].

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::{execute, execute_with, load_config};
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
