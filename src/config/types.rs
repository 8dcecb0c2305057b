use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Tide
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub durability: DurabilityConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub scope: Vec<ScopeEntry>,
    #[serde(default)]
    pub blacklist: Vec<DomainEntry>,
}

/// Worker pool and scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub workers: usize,

    /// Maximum depth to crawl from seed URLs
    pub max_depth: u32,

    /// Maximum route hops within one task execution
    pub hop_limit: usize,

    /// Longest the retry drainer sleeps between checks (milliseconds)
    pub drain_interval_ms: u64,

    /// Maximum number of retry records promoted per drain
    pub drain_batch: usize,

    /// Frontier capacity; 0 means unbounded
    pub frontier_capacity: usize,

    /// Priority given to seed tasks
    pub seed_priority: i32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_depth: 3,
            hop_limit: 8,
            drain_interval_ms: 1000,
            drain_batch: 64,
            frontier_capacity: 0,
            seed_priority: 10,
        }
    }
}

impl CrawlerConfig {
    pub fn frontier_capacity(&self) -> Option<usize> {
        (self.frontier_capacity > 0).then_some(self.frontier_capacity)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Per-host request spacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    pub minimum_delay_ms: u64,

    /// Honor robots.txt rules and Crawl-delay
    pub respect_robots: bool,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            minimum_delay_ms: 1000,
            respect_robots: true,
        }
    }
}

impl PolitenessConfig {
    pub fn minimum_delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.minimum_delay_ms as i64)
    }
}

/// Exponential backoff for transient failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Attempts before a retryable failure is dead-lettered
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Factor applied to the delay for each further attempt
    pub multiplier: f64,

    /// Upper bound for any retry delay (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 30_000,
            multiplier: 2.0,
            max_delay_ms: 3_600_000,
        }
    }
}

/// WAL flush mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    Sync,
    Batched,
    Async,
}

/// Where snapshots are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotBackend {
    File,
    Sqlite,
}

/// Persistence of the scheduling state
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DurabilityConfig {
    /// Directory holding the WAL and snapshot
    pub data_dir: PathBuf,

    pub mode: DurabilityMode,

    /// Batched mode: flush once this many records are pending
    pub max_records: usize,

    /// Batched mode: flush once the oldest pending record is this old (milliseconds)
    pub max_delay_ms: u64,

    /// Async mode: flush at most this often (milliseconds)
    pub flush_interval_ms: u64,

    /// Checkpoint after this many journaled operations; 0 disables
    pub snapshot_every_ops: u64,

    /// Checkpoint after this many seconds; 0 disables
    pub snapshot_every_secs: u64,

    pub backend: SnapshotBackend,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./state"),
            mode: DurabilityMode::Batched,
            max_records: 64,
            max_delay_ms: 1000,
            flush_interval_ms: 1000,
            snapshot_every_ops: 10_000,
            snapshot_every_secs: 300,
            backend: SnapshotBackend::File,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiTide".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// Format: `Name/Version (+contact-url; contact-email)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Allowed domain with seed URLs
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeEntry {
    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,

    /// Seed URLs to start crawling from
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Overrides `crawler.seed-priority` for these seeds
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Simple domain entry for the blacklist
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,
}
