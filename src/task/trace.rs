use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlates a task with its ancestry
///
/// Seed tasks start a new trace; discovered tasks derive a child context that
/// keeps the trace id and points at the parent's span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
}

impl TraceContext {
    /// Starts a new trace
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            parent_span_id: None,
        }
    }

    /// Derives a child context in the same trace
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_has_no_parent() {
        let root = TraceContext::root();
        assert!(root.is_root());
        assert_eq!(root.trace_id().len(), 32);
        assert_eq!(root.span_id().len(), 16);
    }

    #[test]
    fn test_child_keeps_trace_and_links_parent() {
        let root = TraceContext::root();
        let child = root.child();

        assert_eq!(child.trace_id(), root.trace_id());
        assert_ne!(child.span_id(), root.span_id());
        assert_eq!(child.parent_span_id(), Some(root.span_id()));
    }
}
