//! Robots.txt parsing on top of the robotstxt crate

use robotstxt::DefaultMatcher;

/// Parsed robots.txt for one origin
///
/// Allow/disallow matching is delegated to `robotstxt`. Crawl-delay is not
/// covered by that crate and is extracted here, once, at construction.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt body; empty means allow all
    content: String,
    /// Crawl-delay per lowercase user agent token ("*" for the wildcard group)
    delays: Vec<(String, f64)>,
}

impl ParsedRobots {
    /// Parses a robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            delays: parse_crawl_delays(content),
        }
    }

    /// A permissive policy, used when robots.txt is absent or unreachable
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            delays: Vec::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if `url` may be fetched by `user_agent`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl-delay in seconds for `user_agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let agent = user_agent.to_lowercase();
        self.delays
            .iter()
            .find(|(token, _)| token != "*" && agent.contains(token.as_str()))
            .or_else(|| self.delays.iter().find(|(token, _)| token == "*"))
            .map(|(_, delay)| *delay)
    }
}

/// Longest Crawl-delay honored, in seconds; larger values are clamped
pub const MAX_CRAWL_DELAY_SECS: f64 = 86_400.0;

/// Collects `Crawl-delay` values per user-agent group
///
/// A group is a run of `User-agent` lines followed by rules; it ends at the
/// next `User-agent` line that follows a rule.
fn parse_crawl_delays(content: &str) -> Vec<(String, f64)> {
    let mut delays = Vec::new();
    let mut group: Vec<String> = Vec::new();
    let mut in_rules = false;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if in_rules {
                    group.clear();
                    in_rules = false;
                }
                group.push(value.to_lowercase());
            }
            "crawl-delay" => {
                in_rules = true;
                if let Ok(delay) = value.parse::<f64>() {
                    if delay.is_finite() && delay >= 0.0 {
                        let delay = delay.min(MAX_CRAWL_DELAY_SECS);
                        for agent in &group {
                            delays.push((agent.clone(), delay));
                        }
                    }
                }
            }
            _ => in_rules = true,
        }
    }

    delays
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/admin", "TestBot"));
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_disallow_prefix() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("https://example.com/", "TestBot"));
        assert!(!robots.is_allowed("https://example.com/admin/users", "TestBot"));
    }

    #[test]
    fn test_allow_overrides_longer_match() {
        let robots = ParsedRobots::from_content(
            "User-agent: *\nDisallow: /private\nAllow: /private/public",
        );
        assert!(!robots.is_allowed("https://example.com/private", "TestBot"));
        assert!(robots.is_allowed("https://example.com/private/public", "TestBot"));
    }

    #[test]
    fn test_specific_agent_group() {
        let robots =
            ParsedRobots::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(robots.is_allowed("https://example.com/page", "GoodBot"));
        assert!(!robots.is_allowed("https://example.com/page", "BadBot"));
    }

    #[test]
    fn test_crawl_delay_agent_beats_wildcard() {
        let robots = ParsedRobots::from_content(
            "User-agent: *\nCrawl-delay: 10\n\nUser-agent: TestBot\nCrawl-delay: 2.5",
        );
        assert_eq!(robots.crawl_delay("TestBot"), Some(2.5));
        assert_eq!(robots.crawl_delay("testbot"), Some(2.5));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_after_other_rules() {
        let robots =
            ParsedRobots::from_content("User-agent: *\nDisallow: /admin\nCrawl-delay: 4 # slow");
        assert_eq!(robots.crawl_delay("AnyBot"), Some(4.0));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let robots = ParsedRobots::from_content("User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3");
        assert_eq!(robots.crawl_delay("BotA"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotB"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_huge_crawl_delay_is_clamped() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 1e15");
        assert_eq!(robots.crawl_delay("TestBot"), Some(MAX_CRAWL_DELAY_SECS));

        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: inf");
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_garbage_is_permissive() {
        let robots = ParsedRobots::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("https://example.com/any", "TestBot"));
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }
}
