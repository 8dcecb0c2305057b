//! Crawl coordinator
//!
//! Wires configuration into a run and drives it:
//! - restores persisted state and seeds the frontier
//! - runs a pool of workers (checkout, politeness, execute, apply)
//! - runs the retry drainer that promotes eligible retries to the frontier
//! - supervises: WAL flushing, idle detection, Ctrl-C, fatal errors

use crate::config::Config;
use crate::crawler::{
    build_http_client, Decision, DecisionCode, FetchParsePipeline, HttpFetcher, MediaPipeline,
    ParserRegistry, ProcessingEngine, Route, RouteTable, RunContext, TracingDecisionLog,
    CRAWL_ROUTE, MEDIA_ROUTE,
};
use crate::frontier::RetryRecord;
use crate::policy::{
    AllOf, BackoffRetryPolicy, DepthScope, DomainScope, HostPolitenessPolicy, PolitenessPolicy,
    RobotsScope, RATE_LIMITED_REASON,
};
use crate::robots::RobotsRegistry;
use crate::state::RunState;
use crate::storage::{RestoreReport, StateBootstrapper};
use crate::task::{ProcessingTask, TaskDisposition};
use crate::url::DomainMatcher;
use crate::SumiError;
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Longest an idle worker waits before looking at the frontier again
const IDLE_POLL: Duration = Duration::from_millis(200);

/// Supervisor tick: WAL flush deadlines and idle detection
const SUPERVISOR_TICK: Duration = Duration::from_millis(100);

/// Per-run outcome counters, shared by all workers
#[derive(Debug, Default)]
struct RunCounters {
    completed: AtomicU64,
    discarded: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    deferred: AtomicU64,
    promoted: AtomicU64,
}

impl RunCounters {
    fn record(&self, disposition: &TaskDisposition) {
        let counter = match disposition {
            TaskDisposition::Completed { .. } => &self.completed,
            TaskDisposition::Discarded { .. } => &self.discarded,
            TaskDisposition::RetryLater { .. } => &self.retried,
            TaskDisposition::DeadLetter { .. } => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What a finished run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub completed: u64,
    pub discarded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    /// Tasks pushed back by politeness
    pub deferred: u64,
    /// Retry records moved back to the frontier
    pub promoted: u64,
    /// Work left when the run stopped
    pub frontier_remaining: usize,
    pub retry_remaining: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} discarded, {} retries, {} dead letters, {} politeness deferrals in {:.1}s",
            self.completed,
            self.discarded,
            self.retried,
            self.dead_lettered,
            self.deferred,
            self.elapsed.as_secs_f64()
        )?;
        if self.interrupted {
            write!(
                f,
                " (interrupted with {} queued, {} awaiting retry)",
                self.frontier_remaining, self.retry_remaining
            )?;
        }
        Ok(())
    }
}

/// Builds the standard route table: the crawl route plus a media route
pub fn standard_routes(
    client: reqwest::Client,
    robots: Option<Arc<RobotsRegistry>>,
) -> RouteTable {
    let mut crawl = FetchParsePipeline::new(
        Arc::new(HttpFetcher::new(client)),
        Arc::new(ParserRegistry::with_defaults()),
    )
    .with_media_route(MEDIA_ROUTE);
    if let Some(robots) = robots {
        crawl = crawl.with_robots(robots);
    }

    RouteTable::new()
        .with_route(Route::new(CRAWL_ROUTE, Arc::new(crawl)))
        .with_route(Route::new(MEDIA_ROUTE, Arc::new(MediaPipeline)))
        .with_fallback(CRAWL_ROUTE)
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    run: Arc<RunContext>,
    engine: Arc<ProcessingEngine>,
    politeness: Arc<dyn PolitenessPolicy>,
    restore_report: Option<RestoreReport>,
}

impl Coordinator {
    /// Creates a coordinator with durable state
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, stored in snapshots
    /// * `fresh` - Discard persisted state instead of resuming it
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - State restored and policies built
    /// * `Err(SumiError)` - Restoring state or building the HTTP client failed
    pub fn new(config: Config, config_hash: Option<String>, fresh: bool) -> Result<Self, SumiError> {
        let state = Arc::new(RunState::new(config.crawler.frontier_capacity()));
        let mut bootstrapper =
            StateBootstrapper::open(Arc::clone(&state), &config.durability, config_hash, fresh)?;
        let report = bootstrapper.restore()?;

        let client = build_http_client(&config.user_agent)?;
        let robots = config.politeness.respect_robots.then(|| {
            Arc::new(RobotsRegistry::new(
                client.clone(),
                config.user_agent.crawler_name.clone(),
            ))
        });

        let mut scope = AllOf::new()
            .with(DomainScope::new(DomainMatcher::from_config(&config)))
            .with(DepthScope::new(config.crawler.max_depth));
        let mut politeness = HostPolitenessPolicy::new(config.politeness.minimum_delay());
        if let Some(robots) = &robots {
            scope = scope.with(RobotsScope::new(Arc::clone(robots)));
            politeness = politeness.with_robots(Arc::clone(robots));
        }

        let engine = ProcessingEngine::new(
            Arc::new(standard_routes(client, robots)),
            Arc::new(BackoffRetryPolicy::from_config(&config.retry)),
        )
        .with_hop_limit(config.crawler.hop_limit);
        let run = RunContext::new(state, Arc::new(scope), Arc::new(TracingDecisionLog));

        let mut coordinator = Self::from_parts(config, run, engine, Arc::new(politeness));
        coordinator.restore_report = Some(report);
        Ok(coordinator)
    }

    /// Assembles a coordinator from prebuilt parts
    pub fn from_parts(
        config: Config,
        run: RunContext,
        engine: ProcessingEngine,
        politeness: Arc<dyn PolitenessPolicy>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            run: Arc::new(run),
            engine: Arc::new(engine),
            politeness,
            restore_report: None,
        }
    }

    pub fn run_context(&self) -> &Arc<RunContext> {
        &self.run
    }

    pub fn state(&self) -> &Arc<RunState> {
        self.run.state()
    }

    /// What was restored on startup, if durable state is in use
    pub fn restore_report(&self) -> Option<&RestoreReport> {
        self.restore_report.as_ref()
    }

    /// Enqueues the configured seeds; returns how many were accepted
    pub fn seed(&self) -> Result<usize, SumiError> {
        let now = Utc::now();
        let mut accepted = 0;
        for entry in &self.config.scope {
            let priority = entry.priority.unwrap_or(self.config.crawler.seed_priority);
            for seed in &entry.seeds {
                if self.run.enqueue_seed(seed, priority, now)?.is_accepted() {
                    accepted += 1;
                }
            }
        }
        tracing::info!("Seeded {} URLs", accepted);
        Ok(accepted)
    }

    /// Runs the crawl until no work is left, Ctrl-C, or a fatal error
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - Per-disposition counters and elapsed time
    /// * `Err(SumiError)` - A worker hit a storage failure, the hop limit, or panicked
    pub async fn run(self) -> Result<RunSummary, SumiError> {
        let started = Instant::now();
        let workers = self.config.crawler.workers;
        tracing::info!("Starting crawl run {} with {} workers", self.run.run_id(), workers);

        let counters = Arc::new(RunCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<SumiError>();

        let mut joins: Vec<JoinHandle<()>> = Vec::with_capacity(workers + 1);
        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                run: Arc::clone(&self.run),
                engine: Arc::clone(&self.engine),
                politeness: Arc::clone(&self.politeness),
                counters: Arc::clone(&counters),
            };
            let shutdown = shutdown_rx.clone();
            let fatal = fatal_tx.clone();
            joins.push(tokio::spawn(async move {
                if let Err(e) = worker.run(shutdown).await {
                    let _ = fatal.send(e);
                }
            }));
        }

        let drainer = Drainer {
            run: Arc::clone(&self.run),
            interval: self.config.crawler.drain_interval(),
            batch: self.config.crawler.drain_batch,
            counters: Arc::clone(&counters),
        };
        let drainer_shutdown = shutdown_rx.clone();
        let drainer_fatal = fatal_tx.clone();
        joins.push(tokio::spawn(async move {
            if let Err(e) = drainer.run(drainer_shutdown).await {
                let _ = drainer_fatal.send(e);
            }
        }));
        drop(fatal_tx);

        let state = self.run.state();
        let mut interrupted = false;
        let mut fatal: Option<SumiError> = None;
        let mut ticker = tokio::time::interval(SUPERVISOR_TICK);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Interrupt received, stopping workers");
                    interrupted = true;
                    break;
                }
                Some(error) = fatal_rx.recv() => {
                    tracing::error!("Fatal error, stopping run: {}", error);
                    fatal = Some(error);
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = state.flush_journal_if_due() {
                        fatal = Some(e.into());
                        break;
                    }
                    if state.is_idle() {
                        tracing::info!("No work left, crawl complete");
                        break;
                    }
                }
            }
        }

        let _ = shutdown_tx.send(true);
        for join in joins {
            if let Err(e) = join.await {
                tracing::error!("Worker task panicked: {}", e);
                fatal.get_or_insert(SumiError::Worker(e.to_string()));
            }
        }
        if fatal.is_none() {
            fatal = fatal_rx.recv().await;
        }

        if let Some(error) = fatal {
            if let Err(e) = state.flush_journal() {
                tracing::error!("Failed to flush journal after fatal error: {}", e);
            }
            return Err(error);
        }

        state.flush_journal()?;
        state.checkpoint()?;

        let summary = RunSummary {
            run_id: self.run.run_id().to_string(),
            completed: counters.completed.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
            deferred: counters.deferred.load(Ordering::Relaxed),
            promoted: counters.promoted.load(Ordering::Relaxed),
            frontier_remaining: state.frontier().len(),
            retry_remaining: state.retry().size(),
            interrupted,
            elapsed: started.elapsed(),
        };
        tracing::info!("Run {} finished: {}", summary.run_id, summary);
        Ok(summary)
    }
}

struct Worker {
    id: usize,
    run: Arc<RunContext>,
    engine: Arc<ProcessingEngine>,
    politeness: Arc<dyn PolitenessPolicy>,
    counters: Arc<RunCounters>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), SumiError> {
        let state = self.run.state();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(task) = state.checkout()? else {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = state.frontier().notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
                continue;
            };

            let now = Utc::now();
            if let Some(until) = self.politeness.eligible_at(&task, now).filter(|at| *at > now) {
                self.defer_for_politeness(task, until)?;
                continue;
            }

            tracing::debug!("[worker-{}] processing {}", self.id, task.url());
            let disposition = self.engine.execute(&task, &self.run).await?;
            if let TaskDisposition::RetryLater {
                eligible_at,
                reason,
                ..
            } = &disposition
            {
                if reason == RATE_LIMITED_REASON {
                    self.politeness.mark_rate_limited(&task, *eligible_at);
                }
            }
            self.counters.record(&disposition);
            self.engine.apply(&task, disposition, &self.run, Utc::now())?;
        }
        tracing::debug!("[worker-{}] stopped", self.id);
        Ok(())
    }

    fn defer_for_politeness(
        &self,
        task: ProcessingTask,
        until: chrono::DateTime<Utc>,
    ) -> Result<(), SumiError> {
        self.run.record(Decision::for_task(
            DecisionCode::PolitenessDeferred,
            &task,
            format!("host busy until {}", until.to_rfc3339()),
        ));
        self.run.state().defer(RetryRecord {
            task: task.deferred(until),
            eligible_at: until,
            reason: "politeness".to_string(),
            error: None,
        })?;
        self.counters.deferred.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct Drainer {
    run: Arc<RunContext>,
    interval: Duration,
    batch: usize,
    counters: Arc<RunCounters>,
}

impl Drainer {
    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), SumiError> {
        let state = self.run.state();
        let reschedule_after =
            chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::seconds(1));

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = state.promote_ready(Utc::now(), self.batch, reschedule_after)?;
            if !outcome.promoted.is_empty() {
                tracing::trace!("Promoted {} retry records", outcome.promoted.len());
                self.counters
                    .promoted
                    .fetch_add(outcome.promoted.len() as u64, Ordering::Relaxed);
            }
            for (task, reason) in &outcome.rejected {
                self.run.record(Decision::for_task(
                    DecisionCode::RetryPromotionRejected,
                    task,
                    reason.clone(),
                ));
            }

            let wait = match state.retry().peek_eligible_at() {
                Some(at) => (at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(self.interval),
                None => self.interval,
            };
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = state.retry().notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        Ok(())
    }
}
