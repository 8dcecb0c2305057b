//! Statistics over the scheduling state
//!
//! Works on a live `RunState` as well as on one rebuilt from disk for
//! inspection, so the same numbers are available during and after a run.

use crate::state::RunState;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Snapshot of queue sizes and outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    /// Tasks ready to run
    pub frontier: usize,

    /// Tasks checked out by a worker
    pub in_flight: usize,

    /// Tasks waiting for a retry or politeness slot
    pub retry: usize,

    /// Next instant a waiting task becomes eligible
    pub next_retry_at: Option<DateTime<Utc>>,

    /// URLs discovered but not processed yet
    pub discovered: usize,

    /// URLs processed successfully
    pub processed: usize,

    pub dead_letters: usize,

    /// Dead letters grouped by reason
    pub dead_letters_by_reason: BTreeMap<String, usize>,

    /// Frontier tasks grouped by depth
    pub frontier_by_depth: BTreeMap<u32, usize>,
}

impl RunStatistics {
    /// Gathers statistics from the run state
    pub fn gather(state: &RunState) -> Self {
        let (discovered, processed) = state.seen().counts();

        let mut frontier_by_depth = BTreeMap::new();
        let frontier = state.frontier().snapshot();
        for task in &frontier {
            *frontier_by_depth.entry(task.depth()).or_insert(0) += 1;
        }

        let mut dead_letters_by_reason = BTreeMap::new();
        let dead_letters = state.dead_letters().entries();
        for entry in &dead_letters {
            *dead_letters_by_reason
                .entry(entry.item.reason.clone())
                .or_insert(0) += 1;
        }

        Self {
            frontier: frontier.len(),
            in_flight: state.in_flight().size(),
            retry: state.retry().size(),
            next_retry_at: state.retry().peek_eligible_at(),
            discovered,
            processed,
            dead_letters: dead_letters.len(),
            dead_letters_by_reason,
            frontier_by_depth,
        }
    }

    /// Total number of distinct URLs seen
    pub fn total_urls(&self) -> usize {
        self.discovered + self.processed
    }

    /// Share of seen URLs that were processed, as a percentage
    pub fn completion_rate(&self) -> f64 {
        let total = self.total_urls();
        if total == 0 {
            return 0.0;
        }
        (self.processed as f64 / total as f64) * 100.0
    }

    /// Checks if no work is pending
    pub fn is_drained(&self) -> bool {
        self.frontier == 0 && self.in_flight == 0 && self.retry == 0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Queues:");
    println!("  Frontier: {}", stats.frontier);
    println!("  In flight: {}", stats.in_flight);
    println!("  Awaiting retry: {}", stats.retry);
    if let Some(next) = stats.next_retry_at {
        println!("  Next retry at: {}", next.to_rfc3339());
    }
    println!();

    println!("URLs:");
    println!("  Discovered (pending): {}", stats.discovered);
    println!("  Processed: {}", stats.processed);
    println!(
        "  Completion: {:.1}% ({} / {})",
        stats.completion_rate(),
        stats.processed,
        stats.total_urls()
    );
    println!();

    if !stats.frontier_by_depth.is_empty() {
        println!("Frontier by Depth:");
        for (depth, count) in &stats.frontier_by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    println!("Dead Letters: {}", stats.dead_letters);
    let mut reasons: Vec<_> = stats.dead_letters_by_reason.iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(a.1));
    for (reason, count) in reasons {
        println!("  {}: {}", reason, count);
    }
}
