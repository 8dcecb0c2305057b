//! Configuration module for Sumi-Tide
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section except `[user-agent]` has defaults, so a minimal file only
//! needs a scope entry with seeds.
//!
//! # Example
//!
//! ```no_run
//! use sumi_tide::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will run {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DomainEntry, DurabilityConfig, DurabilityMode, PolitenessConfig,
    RetryConfig, ScopeEntry, SnapshotBackend, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
