//! Per-host request spacing

use crate::robots::RobotsRegistry;
use crate::state::{lock, DomainState};
use crate::task::ProcessingTask;
use crate::url::host_key;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Decides the earliest instant a task may run
pub trait PolitenessPolicy: Send + Sync {
    /// Earliest instant `task` may run, or `None` if it may run now
    ///
    /// A returned instant at or before `now` also means "run now".
    /// Implementations that track request slots reserve one when they answer
    /// `None`: the caller is expected to go ahead with the request.
    fn eligible_at(&self, task: &ProcessingTask, now: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Tells the policy a host asked us to back off until `until`
    fn mark_rate_limited(&self, _task: &ProcessingTask, _until: DateTime<Utc>) {}
}

/// Every task is eligible immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl PolitenessPolicy for Immediate {
    fn eligible_at(&self, _task: &ProcessingTask, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

/// Spaces requests to the same host by a minimum delay
///
/// The delay for a host is the larger of the configured minimum and the
/// Crawl-delay its robots.txt asks for. Checking and reserving a slot happen
/// under one lock, so two workers can never both be granted the same host
/// within the delay.
pub struct HostPolitenessPolicy {
    minimum_delay: Duration,
    robots: Option<Arc<RobotsRegistry>>,
    hosts: Mutex<HashMap<String, DomainState>>,
}

impl HostPolitenessPolicy {
    pub fn new(minimum_delay: Duration) -> Self {
        Self {
            minimum_delay,
            robots: None,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Also honor Crawl-delay from cached robots.txt
    pub fn with_robots(mut self, robots: Arc<RobotsRegistry>) -> Self {
        self.robots = Some(robots);
        self
    }

    /// Delay that applies to the host of `task`
    pub fn delay_for(&self, task: &ProcessingTask) -> Duration {
        let crawl_delay = self
            .robots
            .as_ref()
            .and_then(|robots| robots.crawl_delay(task.url()));
        match crawl_delay {
            Some(delay) => delay.max(self.minimum_delay),
            None => self.minimum_delay,
        }
    }

    /// Request bookkeeping for one host key, if the host was seen
    pub fn host_state(&self, host: &str) -> Option<DomainState> {
        lock(&self.hosts).get(host).cloned()
    }

    pub fn tracked_hosts(&self) -> usize {
        lock(&self.hosts).len()
    }
}

impl PolitenessPolicy for HostPolitenessPolicy {
    fn eligible_at(&self, task: &ProcessingTask, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = self.delay_for(task);
        let mut hosts = lock(&self.hosts);
        let state = hosts.entry(host_key(task.url())).or_default();

        if state.can_request(delay, now) {
            state.record_request(now);
            None
        } else {
            state.next_allowed_at(delay)
        }
    }

    fn mark_rate_limited(&self, task: &ProcessingTask, until: DateTime<Utc>) {
        lock(&self.hosts)
            .entry(host_key(task.url()))
            .or_default()
            .mark_rate_limited(until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::ParsedRobots;
    use url::Url;

    fn task(url: &str) -> ProcessingTask {
        ProcessingTask::seed(Url::parse(url).unwrap(), "test", 0, Utc::now())
    }

    #[test]
    fn test_immediate_is_always_eligible() {
        assert_eq!(Immediate.eligible_at(&task("https://a.com/"), Utc::now()), None);
    }

    #[test]
    fn test_first_request_reserves_slot() {
        let policy = HostPolitenessPolicy::new(Duration::seconds(2));
        let now = Utc::now();

        assert_eq!(policy.eligible_at(&task("https://a.com/1"), now), None);
        assert_eq!(
            policy.eligible_at(&task("https://a.com/2"), now),
            Some(now + Duration::seconds(2))
        );
        // Other hosts are independent
        assert_eq!(policy.eligible_at(&task("https://b.com/1"), now), None);
        assert_eq!(policy.tracked_hosts(), 2);
    }

    #[test]
    fn test_slot_frees_after_delay() {
        let policy = HostPolitenessPolicy::new(Duration::seconds(2));
        let now = Utc::now();
        policy.eligible_at(&task("https://a.com/1"), now);

        let later = now + Duration::seconds(2);
        assert_eq!(policy.eligible_at(&task("https://a.com/2"), later), None);
        assert_eq!(policy.host_state("a.com").unwrap().request_count, 2);
    }

    #[test]
    fn test_crawl_delay_raises_minimum() {
        let robots = Arc::new(RobotsRegistry::offline("TestBot"));
        robots.insert(
            &Url::parse("https://slow.com/").unwrap(),
            ParsedRobots::from_content("User-agent: *\nCrawl-delay: 10"),
            Utc::now(),
        );
        let policy = HostPolitenessPolicy::new(Duration::seconds(1)).with_robots(robots);

        assert_eq!(policy.delay_for(&task("https://slow.com/")), Duration::seconds(10));
        assert_eq!(policy.delay_for(&task("https://fast.com/")), Duration::seconds(1));
    }

    #[test]
    fn test_huge_crawl_delay_does_not_overflow() {
        let robots = Arc::new(RobotsRegistry::offline("TestBot"));
        robots.insert(
            &Url::parse("https://slow.com/").unwrap(),
            ParsedRobots::from_content("User-agent: *\nCrawl-delay: 1e15\n"),
            Utc::now(),
        );
        let policy = HostPolitenessPolicy::new(Duration::seconds(1)).with_robots(robots);
        let now = Utc::now();

        assert_eq!(policy.eligible_at(&task("https://slow.com/a"), now), None);
        assert_eq!(
            policy.eligible_at(&task("https://slow.com/b"), now),
            Some(now + Duration::days(1))
        );
    }

    #[test]
    fn test_rate_limit_defers_host() {
        let policy = HostPolitenessPolicy::new(Duration::seconds(1));
        let now = Utc::now();
        let t = task("https://a.com/");
        policy.mark_rate_limited(&t, now + Duration::seconds(60));

        assert_eq!(policy.eligible_at(&t, now), Some(now + Duration::seconds(60)));
    }
}
