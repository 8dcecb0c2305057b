//! Sumi-Tide main entry point
//!
//! This is the command-line interface for the Sumi-Tide crawl scheduler.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_tide::config::{load_config_with_hash, Config};
use sumi_tide::crawler::Coordinator;
use sumi_tide::output::{print_statistics, write_dead_letter_report, RunStatistics};
use sumi_tide::state::RunState;
use sumi_tide::storage::StateBootstrapper;
use sumi_tide::task::TaskId;
use tracing_subscriber::EnvFilter;

/// Sumi-Tide: crash-safe, polite crawl scheduling
///
/// Sumi-Tide crawls the configured scope while respecting robots.txt and
/// per-host delays. Pending, in-flight and retrying work is journaled, so
/// an interrupted or crashed crawl resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "sumi-tide")]
#[command(version)]
#[command(about = "Crash-safe, polite crawl scheduling", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, discarding persisted state
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_dead_letters", "checkpoint", "requeue_dead_letter"])]
    dry_run: bool,

    /// Show statistics from persisted state and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_dead_letters", "checkpoint", "requeue_dead_letter"])]
    stats: bool,

    /// Write a markdown report of the dead-letter queue to PATH and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats", "checkpoint", "requeue_dead_letter"])]
    export_dead_letters: Option<PathBuf>,

    /// Restore persisted state, write a snapshot, truncate the WAL and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_dead_letters", "requeue_dead_letter"])]
    checkpoint: bool,

    /// Put a dead-lettered task back into the frontier as a new task and exit
    #[arg(long, value_name = "TASK_ID", conflicts_with_all = ["dry_run", "stats", "export_dead_letters", "checkpoint"])]
    requeue_dead_letter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(path) = &cli.export_dead_letters {
        handle_export_dead_letters(&config, path)?;
    } else if cli.checkpoint {
        handle_checkpoint(&config, config_hash)?;
    } else if let Some(task_id) = &cli.requeue_dead_letter {
        handle_requeue_dead_letter(&config, config_hash, task_id)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_tide=info,warn"),
            1 => EnvFilter::new("sumi_tide=debug,info"),
            2 => EnvFilter::new("sumi_tide=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Rebuilds persisted state into a detached `RunState` for read-only use
fn inspect_state(config: &Config) -> Result<RunState, Box<dyn std::error::Error>> {
    let recovered = StateBootstrapper::inspect(&config.durability)?;
    let state = RunState::new(None);
    state.install(&recovered);
    Ok(state)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Sumi-Tide Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Hop limit: {}", config.crawler.hop_limit);
    match config.crawler.frontier_capacity() {
        Some(capacity) => println!("  Frontier capacity: {}", capacity),
        None => println!("  Frontier capacity: unbounded"),
    }

    println!("\nPoliteness:");
    println!("  Minimum delay: {}ms", config.politeness.minimum_delay_ms);
    println!("  Respect robots.txt: {}", config.politeness.respect_robots);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms x{} (max {}ms)",
        config.retry.base_delay_ms, config.retry.multiplier, config.retry.max_delay_ms
    );

    println!("\nDurability:");
    println!("  Data dir: {}", config.durability.data_dir.display());
    println!("  WAL mode: {:?}", config.durability.mode);
    println!("  Snapshot backend: {:?}", config.durability.backend);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nScope ({}):", config.scope.len());
    for entry in &config.scope {
        println!("  - {} ({} seeds)", entry.domain, entry.seeds.len());
        for seed in &entry.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\nBlacklisted Domains ({}):", config.blacklist.len());
    for entry in &config.blacklist {
        println!("  - {}", entry.domain);
    }

    let stats = RunStatistics::gather(&inspect_state(config)?);
    if stats.is_drained() && stats.total_urls() == 0 {
        println!("\nNo persisted state; a crawl would start from the seeds");
    } else {
        println!(
            "\nPersisted state: {} queued, {} in flight (would be requeued), {} awaiting retry",
            stats.frontier, stats.in_flight, stats.retry
        );
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        config.scope.iter().map(|s| s.seeds.len()).sum::<usize>()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from persisted state
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("State directory: {}\n", config.durability.data_dir.display());

    let state = inspect_state(config)?;
    print_statistics(&RunStatistics::gather(&state));

    Ok(())
}

/// Handles the --export-dead-letters mode
fn handle_export_dead_letters(
    config: &Config,
    path: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = inspect_state(config)?;
    let stats = RunStatistics::gather(&state);
    write_dead_letter_report(&stats, &state.dead_letters().entries(), path)?;

    println!(
        "✓ {} dead letters exported to: {}",
        stats.dead_letters,
        path.display()
    );
    Ok(())
}

/// Handles the --checkpoint mode: compacts the WAL into a fresh snapshot
fn handle_checkpoint(config: &Config, config_hash: String) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(RunState::new(config.crawler.frontier_capacity()));
    let mut bootstrapper =
        StateBootstrapper::open(state, &config.durability, Some(config_hash), false)?;
    let report = bootstrapper.restore()?;

    println!("✓ Checkpoint written ({})", report);
    Ok(())
}

/// Handles the --requeue-dead-letter mode
fn handle_requeue_dead_letter(
    config: &Config,
    config_hash: String,
    task_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(RunState::new(config.crawler.frontier_capacity()));
    let mut bootstrapper = StateBootstrapper::open(
        Arc::clone(&state),
        &config.durability,
        Some(config_hash),
        false,
    )?;
    bootstrapper.restore()?;

    let id = TaskId::from_string(task_id);
    match state.requeue_dead_letter(&id, "manual requeue", chrono::Utc::now())? {
        Some((task, outcome)) if outcome.is_accepted() => {
            bootstrapper.checkpoint()?;
            println!("✓ Requeued {} as task {}", task.url(), task.id());
            Ok(())
        }
        Some((task, _)) => Err(format!("Frontier rejected requeued task for {}", task.url()).into()),
        None => Err(format!("No dead letter with task id {}", task_id).into()),
    }
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding persisted state)");
    } else {
        tracing::info!("Starting crawl (will resume persisted state if any)");
    }

    tracing::info!(
        "Scope: {}, Blacklist: {}",
        config.scope.len(),
        config.blacklist.len()
    );

    let coordinator = Coordinator::new(config, Some(config_hash), fresh)?;
    coordinator.seed()?;

    match coordinator.run().await {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
