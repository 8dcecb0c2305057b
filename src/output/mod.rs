//! Output module for run statistics and reports
//!
//! This module handles:
//! - Gathering statistics from the scheduling state
//! - Printing them for the `--stats` command
//! - Exporting the dead-letter queue as a markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_dead_letter_report, write_dead_letter_report};
pub use stats::{print_statistics, RunStatistics};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
