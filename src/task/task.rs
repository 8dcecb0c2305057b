use crate::task::{RouteId, TaskId, TaskOrigin, TraceContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// The unit of crawl work
///
/// A `ProcessingTask` is an immutable value. Scheduling transitions return a
/// new task:
///
/// - [`attempt`](Self::attempt) bumps the attempt counter and stamps `scheduled_at`
/// - [`deferred`](Self::deferred) moves `scheduled_at` without consuming an attempt
/// - [`restored`](Self::restored) marks a task requeued during crash recovery
///
/// `depth` is fixed at creation: 0 for seeds, parent depth + 1 for discovered
/// tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTask {
    id: TaskId,
    trace: TraceContext,
    url: Url,
    depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_url: Option<Url>,
    origin: TaskOrigin,
    priority: i32,
    scheduled_at: DateTime<Utc>,
    attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    routing_hint: Option<String>,
}

impl ProcessingTask {
    /// Creates a seed task (depth 0, fresh trace)
    pub fn seed(url: Url, publisher: impl Into<String>, priority: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::generate(),
            trace: TraceContext::root(),
            url,
            depth: 0,
            parent_url: None,
            origin: TaskOrigin::Seed {
                publisher: publisher.into(),
            },
            priority,
            scheduled_at: now,
            attempt: 0,
            routing_hint: None,
        }
    }

    /// Creates a task for a link discovered while processing `parent`
    ///
    /// The child inherits the parent's priority, sits one level deeper and
    /// continues the parent's trace.
    pub fn discovered(
        parent: &ProcessingTask,
        url: Url,
        publisher: impl Into<String>,
        route_id: RouteId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            trace: parent.trace.child(),
            url,
            depth: parent.depth + 1,
            parent_url: Some(parent.url.clone()),
            origin: TaskOrigin::Discovered {
                publisher: publisher.into(),
                route_id,
                parent_id: parent.id.clone(),
            },
            priority: parent.priority,
            scheduled_at: now,
            attempt: 0,
            routing_hint: None,
        }
    }

    /// Sets the routing hint; intended for use right after construction
    pub fn with_routing_hint(mut self, hint: impl Into<String>) -> Self {
        self.routing_hint = Some(hint.into());
        self
    }

    /// Sets the priority; intended for use right after construction
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns the next attempt of this task
    pub fn attempt(&self, now: DateTime<Utc>) -> Self {
        Self {
            attempt: self.attempt + 1,
            scheduled_at: now,
            ..self.clone()
        }
    }

    /// Returns this task pushed back to `until` (attempt unchanged)
    pub fn deferred(&self, until: DateTime<Utc>) -> Self {
        Self {
            scheduled_at: until,
            ..self.clone()
        }
    }

    /// Returns this task as requeued by crash recovery
    pub fn restored(&self, source: impl Into<String>) -> Self {
        Self {
            origin: TaskOrigin::Restored {
                source: source.into(),
            },
            ..self.clone()
        }
    }

    /// Returns a brand new task for the same URL, resubmitted by hand
    ///
    /// Used to replay dead letters: the result has a new id, a fresh attempt
    /// counter and a `Retry` origin, but keeps depth and lineage fields.
    pub fn resubmitted(&self, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::generate(),
            trace: self.trace.child(),
            origin: TaskOrigin::Retry {
                reason: reason.into(),
            },
            scheduled_at: now,
            attempt: 0,
            ..self.clone()
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Dedup key for this task's URL
    pub fn url_key(&self) -> &str {
        self.url.as_str()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent_url(&self) -> Option<&Url> {
        self.parent_url.as_ref()
    }

    pub fn origin(&self) -> &TaskOrigin {
        &self.origin
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt
    }

    pub fn routing_hint(&self) -> Option<&str> {
        self.routing_hint.as_deref()
    }
}
