//! Scope predicates, evaluated before enqueue and again before execution

use crate::robots::RobotsRegistry;
use crate::task::ProcessingTask;
use crate::url::{extract_domain, DomainClassification, DomainMatcher};
use std::sync::Arc;

/// Decides whether a task is within the crawl's scope
pub trait ScopePolicy: Send + Sync {
    /// Why the task is out of scope, or `None` if it is allowed
    fn deny_reason(&self, task: &ProcessingTask) -> Option<String>;

    fn is_allowed(&self, task: &ProcessingTask) -> bool {
        self.deny_reason(task).is_none()
    }
}

/// Allows every task
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ScopePolicy for AllowAll {
    fn deny_reason(&self, _task: &ProcessingTask) -> Option<String> {
        None
    }
}

/// Restricts tasks to the configured domain patterns
#[derive(Debug, Clone)]
pub struct DomainScope {
    matcher: DomainMatcher,
}

impl DomainScope {
    pub fn new(matcher: DomainMatcher) -> Self {
        Self { matcher }
    }
}

impl ScopePolicy for DomainScope {
    fn deny_reason(&self, task: &ProcessingTask) -> Option<String> {
        let Some(domain) = extract_domain(task.url()) else {
            return Some("url has no host".to_string());
        };
        match self.matcher.classify(&domain) {
            DomainClassification::InScope => None,
            DomainClassification::Blacklisted => Some(format!("domain {} is blacklisted", domain)),
            DomainClassification::OutOfScope => Some(format!("domain {} is out of scope", domain)),
        }
    }
}

/// Rejects tasks deeper than `max_depth`
#[derive(Debug, Clone, Copy)]
pub struct DepthScope {
    max_depth: u32,
}

impl DepthScope {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }
}

impl ScopePolicy for DepthScope {
    fn deny_reason(&self, task: &ProcessingTask) -> Option<String> {
        (task.depth() > self.max_depth).then(|| {
            format!(
                "depth {} exceeds max depth {}",
                task.depth(),
                self.max_depth
            )
        })
    }
}

/// Rejects paths disallowed by the cached robots.txt
pub struct RobotsScope {
    registry: Arc<RobotsRegistry>,
}

impl RobotsScope {
    pub fn new(registry: Arc<RobotsRegistry>) -> Self {
        Self { registry }
    }
}

impl ScopePolicy for RobotsScope {
    fn deny_reason(&self, task: &ProcessingTask) -> Option<String> {
        (!self.registry.is_allowed(task.url())).then(|| "disallowed by robots.txt".to_string())
    }
}

/// Allows a task only if every member allows it; the first denial wins
#[derive(Default)]
pub struct AllOf {
    policies: Vec<Box<dyn ScopePolicy>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl ScopePolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl ScopePolicy for AllOf {
    fn deny_reason(&self, task: &ProcessingTask) -> Option<String> {
        self.policies.iter().find_map(|p| p.deny_reason(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::ParsedRobots;
    use crate::task::RouteId;
    use chrono::Utc;
    use url::Url;

    fn seed(url: &str) -> ProcessingTask {
        ProcessingTask::seed(Url::parse(url).unwrap(), "test", 0, Utc::now())
    }

    fn domain_scope() -> DomainScope {
        DomainScope::new(DomainMatcher::new(
            vec!["*.example.com".to_string()],
            vec!["ads.example.com".to_string()],
        ))
    }

    #[test]
    fn test_domain_scope() {
        let scope = domain_scope();
        assert!(scope.is_allowed(&seed("https://blog.example.com/")));
        assert_eq!(
            scope.deny_reason(&seed("https://ads.example.com/")).unwrap(),
            "domain ads.example.com is blacklisted"
        );
        assert!(scope
            .deny_reason(&seed("https://other.org/"))
            .unwrap()
            .contains("out of scope"));
    }

    #[test]
    fn test_depth_scope() {
        let scope = DepthScope::new(1);
        let root = seed("https://example.com/");
        let child = ProcessingTask::discovered(
            &root,
            Url::parse("https://example.com/a").unwrap(),
            "test",
            RouteId::new("route:crawl"),
            Utc::now(),
        );
        let grandchild = ProcessingTask::discovered(
            &child,
            Url::parse("https://example.com/a/b").unwrap(),
            "test",
            RouteId::new("route:crawl"),
            Utc::now(),
        );

        assert!(scope.is_allowed(&root));
        assert!(scope.is_allowed(&child));
        assert!(!scope.is_allowed(&grandchild));
    }

    #[test]
    fn test_robots_scope() {
        let registry = Arc::new(RobotsRegistry::offline("TestBot"));
        registry.insert(
            &Url::parse("https://example.com/").unwrap(),
            ParsedRobots::from_content("User-agent: *\nDisallow: /private"),
            Utc::now(),
        );
        let scope = RobotsScope::new(registry);

        assert!(scope.is_allowed(&seed("https://example.com/public")));
        assert!(!scope.is_allowed(&seed("https://example.com/private/page")));
    }

    #[test]
    fn test_all_of_first_denial_wins() {
        let scope = AllOf::new().with(domain_scope()).with(DepthScope::new(0));
        assert_eq!(scope.len(), 2);

        let reason = scope.deny_reason(&seed("https://other.org/")).unwrap();
        assert!(reason.contains("out of scope"));
        assert!(scope.is_allowed(&seed("https://example.com/")));
        assert!(AllOf::new().is_allowed(&seed("https://anything.net/")));
    }
}
