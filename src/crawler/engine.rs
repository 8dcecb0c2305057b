//! Processing engine
//!
//! `execute` runs one attempt of a task and turns whatever happens into a
//! [`TaskDisposition`]; `apply` carries that disposition out against the
//! shared run state. Pipeline failures never escape `execute`. Durability
//! failures and a blown hop limit do.

use crate::crawler::{Decision, DecisionCode, ProcessingContext, PipelineResult, RouteResolver, RunContext};
use crate::frontier::RetryRecord;
use crate::policy::RetryPolicy;
use crate::storage::StorageError;
use crate::task::{DeadLetterItem, ProcessingTask, RetryDecision, RouteId, TaskDisposition};
use crate::SumiError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Default bound on route hops within one attempt
pub const DEFAULT_HOP_LIMIT: usize = 8;

/// Stage reported for structural failures
const PIPELINE_STAGE: &str = "pipeline";

pub struct ProcessingEngine {
    resolver: Arc<dyn RouteResolver>,
    retry: Arc<dyn RetryPolicy>,
    hop_limit: usize,
}

impl ProcessingEngine {
    pub fn new(resolver: Arc<dyn RouteResolver>, retry: Arc<dyn RetryPolicy>) -> Self {
        Self {
            resolver,
            retry,
            hop_limit: DEFAULT_HOP_LIMIT,
        }
    }

    pub fn with_hop_limit(mut self, hop_limit: usize) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    pub fn hop_limit(&self) -> usize {
        self.hop_limit
    }

    /// Runs one attempt of `task`
    ///
    /// # Returns
    ///
    /// * `Ok(TaskDisposition)` - What should happen to the task
    /// * `Err(SumiError::HopLimitExceeded)` - Pipelines hopped more than the hop limit
    /// * `Err(SumiError::Storage)` - Recording state failed
    pub async fn execute(
        &self,
        task: &ProcessingTask,
        run: &RunContext,
    ) -> Result<TaskDisposition, SumiError> {
        if let Some(reason) = run.scope().deny_reason(task) {
            return Ok(TaskDisposition::Discarded { reason });
        }

        if run.state().seen().is_processed(task.url_key()) {
            return Ok(TaskDisposition::Discarded {
                reason: "already processed".to_string(),
            });
        }

        let Some(mut route) = self.resolver.resolve(task, run) else {
            return Ok(no_route(RouteId::unknown()));
        };

        let mut ctx = ProcessingContext::new(run, task, route.id().clone());
        let mut path = vec![route.id().clone()];

        loop {
            tracing::debug!("Task {} running route {}", task.id(), route.id());
            let outcome = route.pipeline().execute(&mut ctx).await;

            match outcome {
                Ok(PipelineResult::Complete) => break,
                Ok(PipelineResult::Hop(target)) => {
                    // Ordinal of the hop being requested
                    let hop = path.len();
                    path.push(target.clone());
                    if hop > self.hop_limit {
                        return Err(SumiError::HopLimitExceeded {
                            task_id: task.id().clone(),
                            limit: self.hop_limit,
                            path: render_path(&path),
                        });
                    }
                    let Some(next) = self.resolver.route(&target) else {
                        return Ok(no_route(target));
                    };
                    route = next;
                    ctx.set_route(route.id().clone());
                }
                Err(error) => {
                    let error = escalate_storage(error)?;
                    let stage = ctx.stage().to_string();
                    let route_id = ctx.route_id().clone();
                    return Ok(self.classify_failure(task, error, stage, route_id, Utc::now()));
                }
            }
        }

        run.state().mark_processed(task.url_key())?;
        Ok(TaskDisposition::Completed {
            result: ctx.into_result(path.len() - 1),
        })
    }

    fn classify_failure(
        &self,
        task: &ProcessingTask,
        error: anyhow::Error,
        stage_id: String,
        route_id: RouteId,
        now: DateTime<Utc>,
    ) -> TaskDisposition {
        tracing::debug!("Task {} failed in {}: {:#}", task.id(), stage_id, error);
        match self.retry.on_failure(task, &error, now) {
            RetryDecision::Retry {
                eligible_at,
                reason,
            } => TaskDisposition::RetryLater {
                eligible_at,
                reason,
                error: format!("{:#}", error),
                stage_id,
                route_id,
            },
            RetryDecision::Discard { reason } => TaskDisposition::Discarded { reason },
            RetryDecision::DeadLetter { reason } => TaskDisposition::DeadLetter {
                reason,
                error: Some(format!("{:#}", error)),
                stage_id,
                route_id,
            },
        }
    }

    /// Carries out a disposition against the shared run state
    ///
    /// Must only be called once `execute` for the same attempt returned.
    ///
    /// # Arguments
    ///
    /// * `task` - The in-flight task the disposition belongs to
    /// * `disposition` - Outcome returned by `execute`
    /// * `run` - Shared state the task is moved within
    /// * `now` - Time used for deferral and dead-letter timestamps
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The task left the in-flight set
    /// * `Err(SumiError::Storage)` - Journaling the transition failed
    pub fn apply(
        &self,
        task: &ProcessingTask,
        disposition: TaskDisposition,
        run: &RunContext,
        now: DateTime<Utc>,
    ) -> Result<(), SumiError> {
        let state = run.state();
        match disposition {
            TaskDisposition::Completed { result } => {
                state.release(task.id())?;
                run.record(Decision::for_task(
                    DecisionCode::ExecuteCompleted,
                    task,
                    format!(
                        "completed via {} ({} of {} links queued)",
                        result.route_id, result.links_accepted, result.links_found
                    ),
                ));
            }
            TaskDisposition::Discarded { reason } => {
                state.release(task.id())?;
                run.record(Decision::for_task(DecisionCode::ExecuteDiscarded, task, reason));
            }
            TaskDisposition::RetryLater {
                eligible_at,
                reason,
                error,
                ..
            } => {
                let next = task.attempt(now);
                let message = format!(
                    "attempt {} at {} ({})",
                    next.attempt_count() + 1,
                    eligible_at.to_rfc3339(),
                    reason
                );
                state.defer(RetryRecord {
                    task: next,
                    eligible_at,
                    reason,
                    error: Some(error),
                })?;
                run.record(Decision::for_task(DecisionCode::RetryScheduled, task, message));
            }
            TaskDisposition::DeadLetter {
                reason,
                error,
                stage_id,
                route_id,
            } => {
                let item = DeadLetterItem {
                    failed_at: now,
                    reason: reason.clone(),
                    stage_id,
                    route_id,
                    attempts: task.attempt_count() + 1,
                    error,
                };
                state.dead_letter(task.clone(), item)?;
                run.record(Decision::for_task(DecisionCode::DeadLettered, task, reason));
            }
        }
        Ok(())
    }
}

fn no_route(route_id: RouteId) -> TaskDisposition {
    TaskDisposition::DeadLetter {
        reason: "No route resolved".to_string(),
        error: None,
        stage_id: PIPELINE_STAGE.to_string(),
        route_id,
    }
}

fn render_path(path: &[RouteId]) -> String {
    path.iter()
        .map(RouteId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Pulls durability failures out of a pipeline error; anything else is
/// handed back for retry classification
fn escalate_storage(error: anyhow::Error) -> Result<anyhow::Error, SumiError> {
    let error = match error.downcast::<SumiError>() {
        Ok(SumiError::Storage(e)) => return Err(SumiError::Storage(e)),
        Ok(other) => anyhow::Error::from(other),
        Err(error) => error,
    };
    match error.downcast::<StorageError>() {
        Ok(e) => Err(SumiError::Storage(e)),
        Err(error) => Ok(error),
    }
}
