//! When to take a snapshot

use crate::config::DurabilityConfig;
use chrono::{DateTime, Duration, Utc};

/// Predicate deciding whether a checkpoint is due
///
/// Policies compose with [`or`](Self::or): the combined policy fires as soon
/// as any member does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotPolicy {
    Never,
    /// Fire after this many journaled operations
    EveryOperations(u64),
    /// Fire once this much time has passed since the last snapshot
    EveryInterval(Duration),
    Any(Vec<SnapshotPolicy>),
}

impl SnapshotPolicy {
    pub fn should_snapshot(
        &self,
        operations_since: u64,
        now: DateTime<Utc>,
        last_snapshot_at: DateTime<Utc>,
    ) -> bool {
        match self {
            Self::Never => false,
            Self::EveryOperations(n) => *n > 0 && operations_since >= *n,
            Self::EveryInterval(interval) => {
                operations_since > 0 && now - last_snapshot_at >= *interval
            }
            Self::Any(policies) => policies
                .iter()
                .any(|p| p.should_snapshot(operations_since, now, last_snapshot_at)),
        }
    }

    /// Combines two policies with logical OR
    pub fn or(self, other: SnapshotPolicy) -> SnapshotPolicy {
        match (self, other) {
            (Self::Never, p) | (p, Self::Never) => p,
            (Self::Any(mut a), Self::Any(b)) => {
                a.extend(b);
                Self::Any(a)
            }
            (Self::Any(mut a), p) | (p, Self::Any(mut a)) => {
                a.push(p);
                Self::Any(a)
            }
            (a, b) => Self::Any(vec![a, b]),
        }
    }

    /// Builds the policy from `snapshot-every-ops` / `snapshot-every-secs`
    ///
    /// A zero threshold disables that trigger.
    pub fn from_config(config: &DurabilityConfig) -> Self {
        let mut policy = Self::Never;
        if config.snapshot_every_ops > 0 {
            policy = policy.or(Self::EveryOperations(config.snapshot_every_ops));
        }
        if config.snapshot_every_secs > 0 {
            policy = policy.or(Self::EveryInterval(Duration::seconds(
                config.snapshot_every_secs as i64,
            )));
        }
        policy
    }
}
