//! Routes and route resolution
//!
//! A route pairs an id with a pipeline. A pipeline either finishes the task
//! or hands it over to another route (a "hop"); the engine follows hops up to
//! its hop limit.

use crate::crawler::{ProcessingContext, RunContext};
use crate::task::{ProcessingTask, RouteId};
use crate::url::{extract_domain, matches_wildcard};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of running one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    /// The task is done
    Complete,
    /// Continue processing in the given route
    Hop(RouteId),
}

/// Processing steps for a task
///
/// Any error returned is caught by the engine and classified by the retry
/// policy. Pipelines must not hold shared locks across awaits.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn execute(&self, ctx: &mut ProcessingContext<'_>) -> anyhow::Result<PipelineResult>;
}

/// A named pipeline
#[derive(Clone)]
pub struct Route {
    id: RouteId,
    pipeline: Arc<dyn Pipeline>,
}

impl Route {
    pub fn new(id: impl Into<String>, pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            id: RouteId::new(id),
            pipeline,
        }
    }

    pub fn id(&self) -> &RouteId {
        &self.id
    }

    pub fn pipeline(&self) -> &dyn Pipeline {
        self.pipeline.as_ref()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("id", &self.id).finish()
    }
}

/// Finds the route for a task, and hop targets by id
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, task: &ProcessingTask, run: &RunContext) -> Option<Route>;

    fn route(&self, id: &RouteId) -> Option<Route>;
}

/// Static route table
///
/// Resolution order: the task's routing hint, then the first host pattern
/// matching the task's domain, then the fallback route.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<RouteId, Route>,
    host_rules: Vec<(String, RouteId)>,
    fallback: Option<RouteId>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.insert(route.id().clone(), route);
        self
    }

    /// Sends tasks whose domain matches `pattern` (wildcards allowed) to `route_id`
    pub fn route_host(mut self, pattern: impl Into<String>, route_id: impl Into<String>) -> Self {
        self.host_rules
            .push((pattern.into().to_lowercase(), RouteId::new(route_id)));
        self
    }

    pub fn with_fallback(mut self, route_id: impl Into<String>) -> Self {
        self.fallback = Some(RouteId::new(route_id));
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, task: &ProcessingTask, _run: &RunContext) -> Option<Route> {
        if let Some(route) = task
            .routing_hint()
            .and_then(|hint| self.routes.get(&RouteId::new(hint)))
        {
            return Some(route.clone());
        }

        if let Some(domain) = extract_domain(task.url()) {
            let matched = self
                .host_rules
                .iter()
                .find(|(pattern, _)| matches_wildcard(pattern, &domain))
                .and_then(|(_, id)| self.routes.get(id));
            if let Some(route) = matched {
                return Some(route.clone());
            }
        }

        self.fallback.as_ref().and_then(|id| self.route(id))
    }

    fn route(&self, id: &RouteId) -> Option<Route> {
        self.routes.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::MemoryDecisionLog;
    use crate::policy::AllowAll;
    use crate::state::RunState;
    use chrono::Utc;
    use url::Url;

    struct Done;

    #[async_trait]
    impl Pipeline for Done {
        async fn execute(&self, _ctx: &mut ProcessingContext<'_>) -> anyhow::Result<PipelineResult> {
            Ok(PipelineResult::Complete)
        }
    }

    fn run() -> RunContext {
        RunContext::new(
            Arc::new(RunState::new(None)),
            Arc::new(AllowAll),
            Arc::new(MemoryDecisionLog::new()),
        )
    }

    fn task(url: &str) -> ProcessingTask {
        ProcessingTask::seed(Url::parse(url).unwrap(), "test", 0, Utc::now())
    }

    fn table() -> RouteTable {
        RouteTable::new()
            .with_route(Route::new("route:crawl", Arc::new(Done)))
            .with_route(Route::new("route:docs", Arc::new(Done)))
            .with_route(Route::new("route:special", Arc::new(Done)))
            .route_host("*.docs.example.com", "route:docs")
            .with_fallback("route:crawl")
    }

    #[test]
    fn test_resolution_order() {
        let run = run();
        let table = table();

        let hinted = task("https://a.docs.example.com/").with_routing_hint("route:special");
        assert_eq!(table.resolve(&hinted, &run).unwrap().id().as_str(), "route:special");

        let by_host = task("https://a.docs.example.com/");
        assert_eq!(table.resolve(&by_host, &run).unwrap().id().as_str(), "route:docs");

        let other = task("https://example.org/");
        assert_eq!(table.resolve(&other, &run).unwrap().id().as_str(), "route:crawl");
    }

    #[test]
    fn test_unknown_hint_falls_through() {
        let run = run();
        let hinted = task("https://example.org/").with_routing_hint("route:missing");
        assert_eq!(
            table().resolve(&hinted, &run).unwrap().id().as_str(),
            "route:crawl"
        );
    }

    #[test]
    fn test_no_fallback_resolves_nothing() {
        let table = RouteTable::new().with_route(Route::new("route:crawl", Arc::new(Done)));
        assert!(table.resolve(&task("https://example.org/"), &run()).is_none());
        assert!(table.route(&RouteId::new("route:crawl")).is_some());
    }
}
