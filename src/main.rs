//! Binary entry point for ArdhaRAG.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use ardharag::cli::output::{OutputFormat, format_error};
use ardharag::cli::{Cli, execute_with, load_config};
use ardharag::config::LoggingConfig;
use ardharag::logging::init_logging;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);

    let config = load_config(&cli);
    let logging = config
        .as_ref()
        .map_or_else(|_| LoggingConfig::default(), |c| c.logging.clone());
    init_logging(&logging, cli.verbose);

    match config.and_then(|config| execute_with(&cli, config)) {
        Ok(output) => {
            if !output.is_empty() {
                // Piping into `head` or `jq` may close stdout early
                if let Err(e) = write!(io::stdout(), "{output}")
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    eprintln!("Error writing to stdout: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            let error_output = format_error(&e, format);
            match format {
                // JSON errors go to stdout for programmatic parsing
                OutputFormat::Json => println!("{error_output}"),
                OutputFormat::Text => eprintln!("Error: {error_output}"),
            }
            ExitCode::FAILURE
        }
    }
}
