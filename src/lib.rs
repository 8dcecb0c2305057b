//! Sumi-Tide: crash-safe crawl scheduling
//!
//! This crate implements the scheduling and durability core of a polite web
//! crawler: a prioritized frontier, retry and dead-letter handling, a route
//! based processing engine, and a write-ahead log plus snapshots so that
//! pending and in-flight work survives a crash.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod output;
pub mod policy;
pub mod robots;
pub mod state;
pub mod storage;
pub mod task;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Tide operations
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Route hop limit of {limit} exceeded for task {task_id} (path: {path})")]
    HopLimitExceeded {
        task_id: task::TaskId,
        limit: usize,
        path: String,
    },

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Sumi-Tide operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, ProcessingEngine, RunContext};
pub use frontier::{DeadLetterQueue, Frontier, InFlightBuffer, RetryBuffer};
pub use state::{RunState, SeenStore};
pub use task::{ProcessingTask, TaskDisposition, TaskId, TaskOrigin};
