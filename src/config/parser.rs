use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored in snapshots so a resumed run can tell the configuration changed.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hex::encode(Sha256::digest(content.as_bytes())))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurabilityMode, SnapshotBackend};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const FULL_CONFIG: &str = r#"
[crawler]
workers = 8
max-depth = 2
hop-limit = 8
drain-interval-ms = 500
drain-batch = 32
frontier-capacity = 1000
seed-priority = 5

[politeness]
minimum-delay-ms = 250
respect-robots = false

[retry]
max-attempts = 3
base-delay-ms = 1000
multiplier = 3.0
max-delay-ms = 60000

[durability]
data-dir = "/tmp/sumi-state"
mode = "sync"
snapshot-every-ops = 0
backend = "sqlite"

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[[scope]]
domain = "example.com"
seeds = ["https://example.com/"]

[[scope]]
domain = "*.docs.example.org"
seeds = ["https://docs.example.org/start"]
priority = 20

[[blacklist]]
domain = "ads.example.com"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(FULL_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.workers, 8);
        assert_eq!(config.crawler.frontier_capacity(), Some(1000));
        assert_eq!(config.politeness.minimum_delay_ms, 250);
        assert!(!config.politeness.respect_robots);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.durability.mode, DurabilityMode::Sync);
        assert_eq!(config.durability.backend, SnapshotBackend::Sqlite);
        assert_eq!(config.durability.snapshot_every_secs, 300);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(config.scope.len(), 2);
        assert_eq!(config.scope[1].priority, Some(20));
        assert_eq!(config.blacklist.len(), 1);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[[scope]]
domain = "example.com"
seeds = ["https://example.com/"]
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.hop_limit, 8);
        assert_eq!(config.crawler.frontier_capacity(), None);
        assert_eq!(config.durability.mode, DurabilityMode::Batched);
        assert_eq!(config.retry.base_delay_ms, 30_000);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_durability_mode_rejected() {
        let result = parse_config("[durability]\nmode = \"eventually\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let result = parse_config("[crawler]\nworkers = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
