//! Run-level and per-task contexts
//!
//! [`RunContext`] is shared by every worker for the lifetime of a run.
//! [`ProcessingContext`] belongs to exactly one task attempt: pipelines use it
//! to stash intermediate results and to enqueue the links they discover.

use crate::crawler::{Decision, DecisionCode, DecisionLog, FetchResult, ParsedDocument};
use crate::frontier::OfferOutcome;
use crate::policy::ScopePolicy;
use crate::state::RunState;
use crate::task::{ProcessingTask, RouteId, TaskId, TaskResult};
use crate::url::{normalize_url, resolve_link};
use crate::SumiError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

/// Outcome of an enqueue attempt
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueDecision {
    Accepted(TaskId),
    Rejected { code: DecisionCode, reason: String },
}

impl EnqueueDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Shared context of one crawl run
pub struct RunContext {
    run_id: String,
    state: Arc<RunState>,
    scope: Arc<dyn ScopePolicy>,
    decisions: Arc<dyn DecisionLog>,
}

impl RunContext {
    pub fn new(
        state: Arc<RunState>,
        scope: Arc<dyn ScopePolicy>,
        decisions: Arc<dyn DecisionLog>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            state,
            scope,
            decisions,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn scope(&self) -> &dyn ScopePolicy {
        self.scope.as_ref()
    }

    pub fn decisions(&self) -> &dyn DecisionLog {
        self.decisions.as_ref()
    }

    pub fn record(&self, decision: Decision) {
        self.decisions.record(decision);
    }

    /// Enqueues a seed URL from configuration
    ///
    /// Seeds go through the same scope and dedup checks as discovered links,
    /// so re-seeding a resumed run only adds seeds that were never seen.
    ///
    /// # Arguments
    ///
    /// * `raw` - Seed URL as written in the config
    /// * `priority` - Frontier priority of the seed task
    /// * `now` - Creation time of the task
    ///
    /// # Returns
    ///
    /// * `Ok(EnqueueDecision)` - Accepted, or why the seed was rejected
    /// * `Err(SumiError::Storage)` - Journaling the enqueue failed
    pub fn enqueue_seed(
        &self,
        raw: &str,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Result<EnqueueDecision, SumiError> {
        let url = match normalize_url(raw) {
            Ok(url) => url,
            Err(e) => {
                return Ok(self.reject_url(DecisionCode::EnqueueRejectedInvalid, raw, e.to_string()))
            }
        };
        let task = ProcessingTask::seed(url, "config", priority, now);
        self.admit(task)
    }

    /// Scope check, dedup and frontier offer, in that order
    pub(crate) fn admit(&self, task: ProcessingTask) -> Result<EnqueueDecision, SumiError> {
        if let Some(reason) = self.scope.deny_reason(&task) {
            return Ok(self.reject_task(DecisionCode::EnqueueRejectedScope, &task, reason));
        }

        if !self.state.mark_discovered(task.url_key())? {
            return Ok(self.reject_task(
                DecisionCode::EnqueueRejectedDuplicate,
                &task,
                "already discovered".to_string(),
            ));
        }

        let id = task.id().clone();
        let decision = Decision::for_task(
            DecisionCode::EnqueueAccepted,
            &task,
            format!("queued at depth {}", task.depth()),
        );
        match self.state.offer(task.clone())? {
            OfferOutcome::Accepted => {
                self.record(decision);
                Ok(EnqueueDecision::Accepted(id))
            }
            OfferOutcome::Rejected { reason } => Ok(self.reject_task(
                DecisionCode::EnqueueRejectedCapacity,
                &task,
                reason,
            )),
        }
    }

    fn reject_task(
        &self,
        code: DecisionCode,
        task: &ProcessingTask,
        reason: String,
    ) -> EnqueueDecision {
        self.record(Decision::for_task(code, task, reason.clone()));
        EnqueueDecision::Rejected { code, reason }
    }

    fn reject_url(&self, code: DecisionCode, url: &str, reason: String) -> EnqueueDecision {
        self.record(Decision::for_url(code, url, reason.clone()));
        EnqueueDecision::Rejected { code, reason }
    }
}

/// Mutable state of one task attempt
///
/// Owned by a single worker for the duration of one `execute` call and never
/// shared across tasks.
pub struct ProcessingContext<'a> {
    run: &'a RunContext,
    task: &'a ProcessingTask,
    route_id: RouteId,
    stage: &'static str,
    fetched: Option<FetchResult>,
    document: Option<ParsedDocument>,
    links_found: usize,
    links_accepted: usize,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(run: &'a RunContext, task: &'a ProcessingTask, route_id: RouteId) -> Self {
        Self {
            run,
            task,
            route_id,
            stage: "pipeline",
            fetched: None,
            document: None,
            links_found: 0,
            links_accepted: 0,
        }
    }

    pub fn run(&self) -> &RunContext {
        self.run
    }

    pub fn task(&self) -> &ProcessingTask {
        self.task
    }

    /// Route whose pipeline is currently running
    pub fn route_id(&self) -> &RouteId {
        &self.route_id
    }

    pub(crate) fn set_route(&mut self, route_id: RouteId) {
        self.route_id = route_id;
    }

    /// Pipeline stage currently running; reported with failures
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn enter_stage(&mut self, stage: &'static str) {
        tracing::trace!("Task {} entering stage {}", self.task.id(), stage);
        self.stage = stage;
    }

    pub fn fetched(&self) -> Option<&FetchResult> {
        self.fetched.as_ref()
    }

    pub fn set_fetched(&mut self, fetched: FetchResult) {
        self.fetched = Some(fetched);
    }

    pub fn document(&self) -> Option<&ParsedDocument> {
        self.document.as_ref()
    }

    pub fn set_document(&mut self, document: ParsedDocument) {
        self.document = Some(document);
    }

    /// URL relative links are resolved against: the final fetched URL if
    /// there is one, otherwise the task URL
    fn base_url(&self) -> &Url {
        self.fetched
            .as_ref()
            .map(|f| &f.url)
            .unwrap_or_else(|| self.task.url())
    }

    /// Enqueues a link discovered while processing this task
    ///
    /// The link is rejected if it is empty, unparseable, points back at the
    /// page itself, is out of scope or was already discovered. Otherwise a
    /// child task (one level deeper, same priority, child trace) is offered
    /// to the frontier.
    ///
    /// Only durability failures are errors; every rejection is a decision.
    pub fn enqueue(&mut self, raw: &str, publisher: &str) -> Result<EnqueueDecision, SumiError> {
        self.links_found += 1;

        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(self.run.reject_url(
                DecisionCode::EnqueueRejectedEmpty,
                self.task.url().as_str(),
                "empty link".to_string(),
            ));
        }

        let url = match resolve_link(self.base_url(), raw) {
            Ok(url) => url,
            Err(e) => {
                return Ok(self.run.reject_url(
                    DecisionCode::EnqueueRejectedInvalid,
                    raw,
                    e.to_string(),
                ))
            }
        };

        if &url == self.task.url() || &url == self.base_url() {
            return Ok(self.run.reject_url(
                DecisionCode::EnqueueRejectedSelf,
                url.as_str(),
                "link points at its own page".to_string(),
            ));
        }

        let child = ProcessingTask::discovered(
            self.task,
            url,
            publisher,
            self.route_id.clone(),
            Utc::now(),
        );
        let decision = self.run.admit(child)?;
        if decision.is_accepted() {
            self.links_accepted += 1;
        }
        Ok(decision)
    }

    /// Summary of the attempt after the last pipeline completed
    pub fn into_result(self, hops: usize) -> TaskResult {
        TaskResult {
            route_id: self.route_id,
            status: self.fetched.as_ref().map(|f| f.status),
            media_type: self.fetched.as_ref().and_then(|f| f.media_type.clone()),
            title: self.document.and_then(|d| d.title),
            links_found: self.links_found,
            links_accepted: self.links_accepted,
            hops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::MemoryDecisionLog;
    use crate::policy::{AllOf, DepthScope, DomainScope};
    use crate::url::DomainMatcher;

    fn run_context(log: Arc<MemoryDecisionLog>) -> RunContext {
        let scope = AllOf::new()
            .with(DomainScope::new(DomainMatcher::new(
                vec!["example.com".to_string()],
                vec![],
            )))
            .with(DepthScope::new(2));
        RunContext::new(Arc::new(RunState::new(None)), Arc::new(scope), log)
    }

    fn seed_task(run: &RunContext) -> ProcessingTask {
        run.enqueue_seed("https://example.com/", 5, Utc::now()).unwrap();
        run.state().checkout().unwrap().unwrap()
    }

    #[test]
    fn test_enqueue_seed_dedups() {
        let log = Arc::new(MemoryDecisionLog::new());
        let run = run_context(log.clone());

        assert!(run
            .enqueue_seed("https://example.com/", 5, Utc::now())
            .unwrap()
            .is_accepted());
        let again = run
            .enqueue_seed("https://EXAMPLE.com/#top", 5, Utc::now())
            .unwrap();
        assert!(matches!(
            again,
            EnqueueDecision::Rejected {
                code: DecisionCode::EnqueueRejectedDuplicate,
                ..
            }
        ));
        assert_eq!(log.count(DecisionCode::EnqueueAccepted), 1);
    }

    #[test]
    fn test_enqueue_seed_rejects_invalid() {
        let log = Arc::new(MemoryDecisionLog::new());
        let run = run_context(log.clone());
        let decision = run.enqueue_seed("not a url", 0, Utc::now()).unwrap();
        assert!(!decision.is_accepted());
        assert_eq!(log.count(DecisionCode::EnqueueRejectedInvalid), 1);
    }

    #[test]
    fn test_enqueue_builds_child_task() {
        let run = run_context(Arc::new(MemoryDecisionLog::new()));
        let parent = seed_task(&run);
        let mut ctx = ProcessingContext::new(&run, &parent, RouteId::new("route:crawl"));

        assert!(ctx.enqueue("/about", "html").unwrap().is_accepted());

        let child = run.state().frontier().poll().unwrap();
        assert_eq!(child.url().as_str(), "https://example.com/about");
        assert_eq!(child.depth(), 1);
        assert_eq!(child.priority(), 5);
        assert_eq!(child.parent_url(), Some(parent.url()));
        assert_eq!(child.trace().trace_id(), parent.trace().trace_id());
    }

    #[test]
    fn test_enqueue_rejections_in_order() {
        let log = Arc::new(MemoryDecisionLog::new());
        let run = run_context(log.clone());
        let parent = seed_task(&run);
        let mut ctx = ProcessingContext::new(&run, &parent, RouteId::new("route:crawl"));

        let code = |d: EnqueueDecision| match d {
            EnqueueDecision::Rejected { code, .. } => Some(code),
            EnqueueDecision::Accepted(_) => None,
        };

        assert_eq!(
            code(ctx.enqueue("  ", "html").unwrap()),
            Some(DecisionCode::EnqueueRejectedEmpty)
        );
        assert_eq!(
            code(ctx.enqueue("mailto:a@example.com", "html").unwrap()),
            Some(DecisionCode::EnqueueRejectedInvalid)
        );
        assert_eq!(
            code(ctx.enqueue("/#top", "html").unwrap()),
            Some(DecisionCode::EnqueueRejectedSelf)
        );
        assert_eq!(
            code(ctx.enqueue("https://other.org/", "html").unwrap()),
            Some(DecisionCode::EnqueueRejectedScope)
        );
        assert_eq!(code(ctx.enqueue("/a", "html").unwrap()), None);
        assert_eq!(
            code(ctx.enqueue("/a?utm_source=x", "html").unwrap()),
            Some(DecisionCode::EnqueueRejectedDuplicate)
        );

        let result = ctx.into_result(0);
        assert_eq!(result.links_found, 6);
        assert_eq!(result.links_accepted, 1);
    }

    #[test]
    fn test_concurrent_enqueue_of_same_url_accepts_once() {
        let run = Arc::new(run_context(Arc::new(MemoryDecisionLog::new())));
        let parent = Arc::new(seed_task(&run));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let run = Arc::clone(&run);
                let parent = Arc::clone(&parent);
                std::thread::spawn(move || {
                    let mut ctx =
                        ProcessingContext::new(&run, &parent, RouteId::new("route:crawl"));
                    ctx.enqueue("/shared", "html").unwrap().is_accepted()
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| *a)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(run.state().frontier().len(), 1);
    }
}
