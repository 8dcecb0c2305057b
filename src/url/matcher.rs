use crate::config::Config;

/// Checks if a domain matches a pattern
///
/// `"example.com"` matches only itself. `"*.example.com"` matches the bare
/// domain and any subdomain at any depth. Matching is case-sensitive; hosts
/// are lowercased before they get here.
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map(|prefix| prefix.ends_with('.'))
                    .unwrap_or(false)
        }
        None => candidate == pattern,
    }
}

/// How a host relates to the configured scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainClassification {
    /// Matches a scope pattern and no blacklist pattern
    InScope,
    /// Matches a blacklist pattern (wins over scope)
    Blacklisted,
    /// Matches no scope pattern
    OutOfScope,
}

impl DomainClassification {
    pub fn should_crawl(&self) -> bool {
        matches!(self, Self::InScope)
    }
}

/// Allowed and blocked domain patterns
#[derive(Debug, Clone, Default)]
pub struct DomainMatcher {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl DomainMatcher {
    pub fn new(allowed: Vec<String>, blocked: Vec<String>) -> Self {
        Self { allowed, blocked }
    }

    /// Builds the matcher from `[[scope]]` and `[[blacklist]]`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.scope.iter().map(|e| e.domain.to_lowercase()).collect(),
            config
                .blacklist
                .iter()
                .map(|e| e.domain.to_lowercase())
                .collect(),
        )
    }

    /// Classifies a lowercase host; the blacklist takes priority
    pub fn classify(&self, domain: &str) -> DomainClassification {
        if self.blocked.iter().any(|p| matches_wildcard(p, domain)) {
            DomainClassification::Blacklisted
        } else if self.allowed.iter().any(|p| matches_wildcard(p, domain)) {
            DomainClassification::InScope
        } else {
            DomainClassification::OutOfScope
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_wildcard("*.example.com", "example.com"));
        assert!(matches_wildcard("*.example.com", "blog.example.com"));
        assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
    }

    #[test]
    fn test_wildcard_rejects_lookalikes() {
        assert!(!matches_wildcard("*.example.com", "myexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
        assert!(!matches_wildcard("*.example.com", "example.org"));
        assert!(!matches_wildcard("*.example.com", ""));
    }

    #[test]
    fn test_classify_blacklist_wins() {
        let matcher = DomainMatcher::new(
            vec!["*.example.com".to_string()],
            vec!["ads.example.com".to_string()],
        );
        assert_eq!(matcher.classify("example.com"), DomainClassification::InScope);
        assert_eq!(
            matcher.classify("ads.example.com"),
            DomainClassification::Blacklisted
        );
        assert_eq!(
            matcher.classify("other.org"),
            DomainClassification::OutOfScope
        );
        assert!(!DomainClassification::Blacklisted.should_crawl());
    }
}
