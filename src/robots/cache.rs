//! Per-origin robots.txt cache

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use url::Url;

/// Robots.txt is refetched once it is older than this
const ROBOTS_TTL_HOURS: i64 = 24;

/// Robots.txt for one origin with its fetch time
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots, fetched_at: DateTime<Utc>) -> Self {
        Self {
            content,
            fetched_at,
        }
    }

    /// Checks if the entry is older than 24 hours at `now`
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at > Duration::hours(ROBOTS_TTL_HOURS)
    }
}

/// Shared robots.txt cache, keyed by origin (`scheme://host:port`)
///
/// Lookups never block on the network: an origin that has not been fetched
/// yet is treated as allowing everything. [`ensure`](Self::ensure) fetches
/// missing or stale entries before a request goes out.
#[derive(Debug)]
pub struct RobotsRegistry {
    client: Option<reqwest::Client>,
    user_agent: String,
    entries: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsRegistry {
    /// Creates a registry that fetches robots.txt with `client`
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            user_agent: user_agent.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry that never fetches; only inserted entries apply
    pub fn offline(user_agent: impl Into<String>) -> Self {
        Self {
            client: None,
            user_agent: user_agent.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Stores robots.txt for the origin of `url`
    pub fn insert(&self, url: &Url, robots: ParsedRobots, fetched_at: DateTime<Utc>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin_key(url), CachedRobots::new(robots, fetched_at));
    }

    fn cached(&self, url: &Url) -> Option<CachedRobots> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&origin_key(url))
            .cloned()
    }

    /// Checks `url` against the cached rules
    pub fn is_allowed(&self, url: &Url) -> bool {
        self.cached(url)
            .map(|entry| entry.content.is_allowed(url.as_str(), &self.user_agent))
            .unwrap_or(true)
    }

    /// Crawl-delay of the origin of `url`, if robots.txt sets one
    pub fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        self.cached(url)
            .and_then(|entry| entry.content.crawl_delay(&self.user_agent))
            .map(|secs| Duration::milliseconds((secs * 1000.0) as i64))
    }

    /// Fetches robots.txt for the origin of `url` if missing or stale
    ///
    /// Failures are not errors: a missing or unreachable robots.txt allows
    /// everything.
    pub async fn ensure(&self, url: &Url) {
        let Some(client) = &self.client else {
            return;
        };
        let now = Utc::now();
        if matches!(self.cached(url), Some(entry) if !entry.is_stale(now)) {
            return;
        }

        let robots = fetch_robots(client, url).await;
        self.insert(url, robots, now);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Fetches and parses `/robots.txt` for the origin of `url`
async fn fetch_robots(client: &reqwest::Client, url: &Url) -> ParsedRobots {
    let robots_url = match url.join("/robots.txt") {
        Ok(robots_url) => robots_url,
        Err(_) => return ParsedRobots::allow_all(),
    };

    match client.get(robots_url.clone()).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => {
                tracing::debug!("Fetched {}", robots_url);
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!("{} returned {}, allowing all", robots_url, response.status());
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let fresh = CachedRobots::new(ParsedRobots::allow_all(), now - Duration::hours(23));
        let stale = CachedRobots::new(ParsedRobots::allow_all(), now - Duration::hours(25));
        assert!(!fresh.is_stale(now));
        assert!(stale.is_stale(now));
    }

    #[test]
    fn test_unknown_origin_is_allowed() {
        let registry = RobotsRegistry::offline("TestBot");
        let url = Url::parse("https://example.com/admin").unwrap();
        assert!(registry.is_allowed(&url));
        assert_eq!(registry.crawl_delay(&url), None);
    }

    #[test]
    fn test_inserted_rules_apply_per_origin() {
        let registry = RobotsRegistry::offline("TestBot");
        let url = Url::parse("https://example.com/").unwrap();
        registry.insert(
            &url,
            ParsedRobots::from_content("User-agent: *\nDisallow: /admin\nCrawl-delay: 2"),
            Utc::now(),
        );

        assert!(!registry.is_allowed(&Url::parse("https://example.com/admin").unwrap()));
        assert!(registry.is_allowed(&Url::parse("https://other.com/admin").unwrap()));
        assert_eq!(registry.crawl_delay(&url), Some(Duration::seconds(2)));
    }

    #[tokio::test]
    async fn test_ensure_fetches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
            .expect(1)
            .mount(&server)
            .await;

        let registry = RobotsRegistry::new(reqwest::Client::new(), "TestBot");
        let page = Url::parse(&format!("{}/page", server.uri())).unwrap();
        registry.ensure(&page).await;
        registry.ensure(&page).await;

        let private = Url::parse(&format!("{}/private/x", server.uri())).unwrap();
        assert!(!registry.is_allowed(&private));
        assert!(registry.is_allowed(&page));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let registry = RobotsRegistry::new(reqwest::Client::new(), "TestBot");
        let page = Url::parse(&format!("{}/anything", server.uri())).unwrap();
        registry.ensure(&page).await;
        assert!(registry.is_allowed(&page));
        assert_eq!(registry.len(), 1);
    }
}
