//! Integration tests for crash recovery
//!
//! A "crash" here is dropping the run state without a final checkpoint: the
//! snapshot and WAL on disk are all a restart gets to see.

use chrono::Utc;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use sumi_tide::config::{DurabilityConfig, DurabilityMode, SnapshotBackend};
use sumi_tide::frontier::RetryRecord;
use sumi_tide::state::RunState;
use sumi_tide::storage::{wal_path, RestoreReport, StateBootstrapper};
use sumi_tide::task::{DeadLetterItem, ProcessingTask, RouteId, TaskOrigin};
use url::Url;

fn durability(dir: &Path, backend: SnapshotBackend) -> DurabilityConfig {
    DurabilityConfig {
        data_dir: dir.to_path_buf(),
        mode: DurabilityMode::Sync,
        backend,
        ..DurabilityConfig::default()
    }
}

/// Opens and restores the state under `config`, as a starting process would
fn start(config: &DurabilityConfig) -> (Arc<RunState>, StateBootstrapper, RestoreReport) {
    let state = Arc::new(RunState::new(None));
    let mut bootstrapper =
        StateBootstrapper::open(Arc::clone(&state), config, Some("hash-a".to_string()), false)
            .unwrap();
    let report = bootstrapper.restore().unwrap();
    (state, bootstrapper, report)
}

/// Marks `url` discovered and offers a seed task for it
fn enqueue(state: &RunState, url: &str) -> ProcessingTask {
    let task = ProcessingTask::seed(Url::parse(url).unwrap(), "test", 0, Utc::now());
    assert!(state.mark_discovered(task.url_key()).unwrap());
    assert!(state.offer(task.clone()).unwrap().is_accepted());
    task
}

#[test]
fn test_empty_directory_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _bootstrapper, report) = start(&durability(dir.path(), SnapshotBackend::File));

    assert!(report.is_empty());
    assert!(state.is_idle());
    assert!(state.has_journal());
}

#[test]
fn test_in_flight_task_is_requeued_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    let running_id = {
        let (state, _bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/a");
        enqueue(&state, "https://example.com/b");
        enqueue(&state, "https://example.com/c");
        let running = state.checkout().unwrap().unwrap();
        assert_eq!(state.in_flight().size(), 1);
        running.id().clone()
    };

    let (state, bootstrapper, report) = start(&config);
    assert_eq!(report.requeued_in_flight, 1);
    assert_eq!(report.frontier, 3);
    assert_eq!(state.frontier().len(), 3);
    assert_eq!(state.in_flight().size(), 0);

    let requeued = state
        .frontier()
        .snapshot()
        .into_iter()
        .find(|task| task.id() == &running_id)
        .expect("interrupted task back in the frontier");
    assert!(matches!(requeued.origin(), TaskOrigin::Restored { .. }));
    drop(bootstrapper);
    drop(state);

    // A second restart finds nothing left to requeue
    let (state, _bootstrapper, report) = start(&config);
    assert_eq!(report.requeued_in_flight, 0);
    assert_eq!(state.frontier().len(), 3);
}

#[test]
fn test_finished_work_is_not_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    {
        let (state, _bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/done");
        let task = state.checkout().unwrap().unwrap();
        assert!(state.mark_processed(task.url_key()).unwrap());
        state.release(task.id()).unwrap();
    }

    let (state, _bootstrapper, report) = start(&config);
    assert!(report.replayed > 0);
    assert_eq!(report.requeued_in_flight, 0);
    assert!(state.is_idle());
    assert!(state.seen().is_processed("https://example.com/done"));
}

#[test]
fn test_snapshot_plus_wal_tail() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    {
        let (state, bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/1");
        enqueue(&state, "https://example.com/2");
        bootstrapper.checkpoint().unwrap();

        // Only in the WAL from here on
        enqueue(&state, "https://example.com/3");
        let task = state.checkout().unwrap().unwrap();
        let eligible_at = Utc::now() + chrono::Duration::seconds(60);
        state
            .defer(RetryRecord {
                task: task.attempt(Utc::now()),
                eligible_at,
                reason: "server error 503".to_string(),
                error: Some("HTTP 503".to_string()),
            })
            .unwrap();
    }

    let (state, _bootstrapper, report) = start(&config);
    assert!(report.snapshot_sequence.is_some());
    assert_eq!(report.replayed, 4);
    assert_eq!(report.frontier, 2);
    assert_eq!(report.retry, 1);
    assert_eq!(report.seen, 3);

    let retry = state.retry().snapshot();
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].task.attempt_count(), 1);
    assert_eq!(retry[0].reason, "server error 503");
}

#[test]
fn test_sqlite_snapshot_backend() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::Sqlite);

    {
        let (state, bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/x");
        bootstrapper.checkpoint().unwrap();
        enqueue(&state, "https://example.com/y");
    }

    assert!(dir.path().join("snapshot.db").exists());
    let (state, _bootstrapper, report) = start(&config);
    assert!(report.snapshot_sequence.is_some());
    assert_eq!(state.frontier().len(), 2);
}

#[test]
fn test_torn_wal_tail_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    {
        let (state, _bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/kept");
    }

    let mut wal = std::fs::OpenOptions::new()
        .append(true)
        .open(wal_path(&config))
        .unwrap();
    wal.write_all(b"0123456789abcdef\t{\"seq\":99,\"at\":").unwrap();
    drop(wal);

    let (state, _bootstrapper, report) = start(&config);
    assert_eq!(report.frontier, 1);
    assert_eq!(state.frontier().len(), 1);
}

#[test]
fn test_dead_letters_survive_and_can_be_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    let dead_id = {
        let (state, _bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/broken");
        let task = state.checkout().unwrap().unwrap();
        state
            .dead_letter(
                task.clone(),
                DeadLetterItem {
                    failed_at: Utc::now(),
                    reason: "client error 403".to_string(),
                    stage_id: "fetch".to_string(),
                    route_id: RouteId::new("route:crawl"),
                    attempts: 1,
                    error: None,
                },
            )
            .unwrap();
        task.id().clone()
    };

    let (state, bootstrapper, report) = start(&config);
    assert_eq!(report.dead_letters, 1);
    assert!(state.is_idle());

    let (task, outcome) = state
        .requeue_dead_letter(&dead_id, "manual requeue", Utc::now())
        .unwrap()
        .expect("dead letter exists");
    assert!(outcome.is_accepted());
    assert_ne!(task.id(), &dead_id);
    assert_eq!(task.attempt_count(), 0);
    bootstrapper.checkpoint().unwrap();
    drop(bootstrapper);
    drop(state);

    let (state, _bootstrapper, _) = start(&config);
    assert_eq!(state.frontier().len(), 1);
    assert_eq!(state.dead_letters().len(), 1);
}

#[test]
fn test_config_change_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    {
        let (state, _bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/");
    }

    let state = Arc::new(RunState::new(None));
    let mut bootstrapper =
        StateBootstrapper::open(Arc::clone(&state), &config, Some("hash-b".to_string()), false)
            .unwrap();
    let report = bootstrapper.restore().unwrap();
    assert!(report.config_changed);
    assert_eq!(state.frontier().len(), 1);
}

#[test]
fn test_fresh_discards_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = durability(dir.path(), SnapshotBackend::File);

    {
        let (state, _bootstrapper, _) = start(&config);
        enqueue(&state, "https://example.com/");
    }

    let state = Arc::new(RunState::new(None));
    let mut bootstrapper =
        StateBootstrapper::open(Arc::clone(&state), &config, None, true).unwrap();
    let report = bootstrapper.restore().unwrap();
    assert!(report.is_empty());
    assert!(state.is_idle());
    assert!(state.seen().is_empty());
}
