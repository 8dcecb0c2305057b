use chrono::{DateTime, Duration, Utc};

/// Tracks the request history of one host
///
/// Politeness uses this to space out requests: a host may be hit again once
/// `delay` has elapsed since the last request, and not before a rate-limit
/// backoff (HTTP 429) has expired.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests granted to this host in the current run
    pub request_count: u64,

    /// When the last request to this host was granted
    pub last_request_at: Option<DateTime<Utc>>,

    /// Host asked us to back off until this instant
    pub rate_limited_until: Option<DateTime<Utc>>,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest instant the next request may be sent, given a minimum delay
    ///
    /// # Arguments
    ///
    /// * `delay` - Minimum spacing between two requests to this host
    ///
    /// # Returns
    ///
    /// * `None` - The host has never been requested and is not rate limited
    /// * `Some(at)` - The earliest permitted instant, saturating at the latest
    ///   representable time
    pub fn next_allowed_at(&self, delay: Duration) -> Option<DateTime<Utc>> {
        let after_delay = self.last_request_at.map(|last| {
            last.checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        match (after_delay, self.rate_limited_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Checks if a request may be sent at `now`
    pub fn can_request(&self, delay: Duration, now: DateTime<Utc>) -> bool {
        self.next_allowed_at(delay)
            .map(|next| next <= now)
            .unwrap_or(true)
    }

    /// Records that a request slot was granted
    pub fn record_request(&mut self, now: DateTime<Utc>) {
        self.request_count += 1;
        self.last_request_at = Some(now);
    }

    /// Marks the host as rate limited until `until`
    pub fn mark_rate_limited(&mut self, until: DateTime<Utc>) {
        self.rate_limited_until = Some(
            self.rate_limited_until
                .map(|current| current.max(until))
                .unwrap_or(until),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_can_request() {
        let state = DomainState::new();
        assert!(state.can_request(Duration::seconds(1), Utc::now()));
        assert_eq!(state.next_allowed_at(Duration::seconds(1)), None);
    }

    #[test]
    fn test_cannot_request_too_soon() {
        let now = Utc::now();
        let mut state = DomainState::new();
        state.record_request(now);

        assert!(!state.can_request(Duration::seconds(1), now));
        assert!(state.can_request(Duration::seconds(1), now + Duration::seconds(1)));
        assert_eq!(state.request_count, 1);
    }

    #[test]
    fn test_rate_limit_extends_wait() {
        let now = Utc::now();
        let mut state = DomainState::new();
        state.record_request(now);
        state.mark_rate_limited(now + Duration::seconds(60));

        assert_eq!(
            state.next_allowed_at(Duration::seconds(1)),
            Some(now + Duration::seconds(60))
        );
    }

    #[test]
    fn test_oversized_delay_saturates() {
        let now = Utc::now();
        let mut state = DomainState::new();
        state.record_request(now);

        assert_eq!(
            state.next_allowed_at(Duration::MAX),
            Some(DateTime::<Utc>::MAX_UTC)
        );
        assert!(!state.can_request(Duration::MAX, now + Duration::days(365)));
    }

    #[test]
    fn test_rate_limit_never_shrinks() {
        let now = Utc::now();
        let mut state = DomainState::new();
        state.mark_rate_limited(now + Duration::seconds(60));
        state.mark_rate_limited(now + Duration::seconds(10));
        assert_eq!(state.rate_limited_until, Some(now + Duration::seconds(60)));
    }
}
