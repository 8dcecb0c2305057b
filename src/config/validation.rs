use crate::config::types::{
    Config, CrawlerConfig, DomainEntry, DurabilityConfig, DurabilityMode, RetryConfig,
    ScopeEntry, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_durability_config(&config.durability)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_scope(&config.scope)?;
    validate_blacklist_domains(&config.blacklist)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.hop_limit == 0 {
        return Err(ConfigError::Validation(
            "hop-limit must be at least 1".to_string(),
        ));
    }

    if config.drain_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "drain-interval-ms must be greater than 0".to_string(),
        ));
    }

    if config.drain_batch == 0 {
        return Err(ConfigError::Validation(
            "drain-batch must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry backoff configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "max-attempts must be at least 1".to_string(),
        ));
    }

    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "multiplier must be >= 1.0, got {}",
            config.multiplier
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must not be below base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates durability configuration
fn validate_durability_config(config: &DurabilityConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    match config.mode {
        DurabilityMode::Batched if config.max_records == 0 => Err(ConfigError::Validation(
            "max-records must be greater than 0 in batched mode".to_string(),
        )),
        DurabilityMode::Async if config.flush_interval_ms == 0 => Err(ConfigError::Validation(
            "flush-interval-ms must be greater than 0 in async mode".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates scope entries and their seed URLs
fn validate_scope(entries: &[ScopeEntry]) -> Result<(), ConfigError> {
    for entry in entries {
        validate_domain_pattern(&entry.domain)?;

        for seed in &entry.seeds {
            let url = Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;

            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' must use HTTP or HTTPS",
                    seed
                )));
            }
        }
    }

    Ok(())
}

/// Validates blacklist domain entries
fn validate_blacklist_domains(domains: &[DomainEntry]) -> Result<(), ConfigError> {
    for entry in domains {
        validate_domain_pattern(&entry.domain)?;
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    // Check if it's a wildcard pattern
    if let Some(domain) = pattern.strip_prefix("*.") {
        // Validate the base domain part
        validate_domain_string(domain)?;
    } else {
        // Regular domain
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    // Check for invalid characters
    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    // Check that it doesn't start or end with a dot or hyphen
    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    // Check for consecutive dots
    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // Must contain at least one dot (e.g., example.com, not just "example")
    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("sub.example.com").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern("example").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example.com.").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_workers_range() {
        let mut config = Config::default();
        config.crawler.workers = 257;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_hop_limit() {
        let mut config = Config::default();
        config.crawler.hop_limit = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_retry() {
        let mut config = Config::default();
        config.retry.multiplier = 0.5;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.retry.max_delay_ms = config.retry.base_delay_ms - 1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_durability() {
        let mut config = Config::default();
        config.durability.data_dir = std::path::PathBuf::new();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.durability.mode = DurabilityMode::Async;
        config.durability.flush_interval_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_seed_scheme() {
        let mut config = Config::default();
        config.scope.push(ScopeEntry {
            domain: "example.com".to_string(),
            seeds: vec!["ftp://example.com/file".to_string()],
            priority: None,
        });
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }
}
