//! Analysis Worker - Works through the queue of positions awaiting analysis.
//!
//! Every poll interval the worker runs one pass over the queue: positions
//! with a deep enough known evaluation are committed, uninteresting ones are
//! dropped and the rest go to Stockfish. Engine results are committed as they
//! arrive.

mod config;
mod engine;

use analysis_queue::{evaluation_channel, Orchestrator, QueueItem};
use analysis_store::{init_db, DbPool, SqliteQueue, SqliteStore};
use clap::{Parser, Subcommand};
use config::WorkerConfig;
use engine::StockfishEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Analysis Worker - Evaluates queued chess positions.
#[derive(Parser)]
#[command(name = "analysis-worker")]
#[command(about = "Evaluates queued chess positions")]
struct Cli {
    /// Path to the worker configuration file
    #[arg(long, default_value = "worker.toml")]
    config: PathBuf,

    /// Path to SQLite database (overrides the configuration)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the queue until interrupted
    Run {
        /// Poll interval in milliseconds (overrides the configuration)
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Queue a position for analysis
    Enqueue {
        /// Position in FEN notation
        #[arg(long)]
        fen: String,
        /// Required evaluation depth
        #[arg(long)]
        depth: u32,
        /// Moves leading to the position
        moves: Vec<String>,
    },
    /// List queued positions
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut config = WorkerConfig::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.database = db;
    }

    if let Some(parent) = config.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = init_db(&config.database)?;

    match cli.command {
        Commands::Run { poll_interval } => {
            if let Some(ms) = poll_interval {
                config.poll_interval_ms = ms;
            }
            run(&config, db).await
        }
        Commands::Enqueue { fen, depth, moves } => {
            let queue = SqliteQueue::new(db);
            let item = QueueItem::new(fen, moves, depth);
            if queue.enqueue(&item)? {
                println!("Queued {} at depth {}", item.fen, item.depth);
            } else {
                println!("{} is already queued at depth {} or deeper", item.fen, item.depth);
            }
            Ok(())
        }
        Commands::Status => {
            let queue = SqliteQueue::new(db.clone());
            let store = SqliteStore::new(db);
            let items = queue.items()?;
            println!("{} queued, {} evaluated", items.len(), store.count()?);
            for item in items {
                println!("  depth {:>3}  {}  [{}]", item.depth, item.fen, item.line());
            }
            Ok(())
        }
    }
}

fn build_orchestrator(
    config: &WorkerConfig,
    db: &DbPool,
    engine: Arc<StockfishEngine>,
) -> Result<Orchestrator, config::ConfigError> {
    let mut builder = Orchestrator::builder()
        .queue(Arc::new(SqliteQueue::new(db.clone())))
        .store(Arc::new(SqliteStore::new(db.clone())))
        .sources(config.build_sources(db)?)
        .engine(engine);
    if let Some(filter) = config.build_filter() {
        builder = builder.filter(filter);
    }
    Ok(builder.build()?)
}

async fn run(config: &WorkerConfig, db: DbPool) -> anyhow::Result<()> {
    let (results_tx, results_rx) = evaluation_channel();
    let engine = Arc::new(StockfishEngine::new(&config.engine, results_tx));
    let orchestrator = Arc::new(build_orchestrator(config, &db, engine.clone())?);

    tracing::info!("Starting analysis-worker");
    tracing::info!("Database: {:?}", config.database);
    tracing::info!("Poll interval: {}ms", config.poll_interval_ms);
    tracing::info!("Sources: {:?}", orchestrator.source_names());

    let committer = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.drain_evaluations(results_rx).await }
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // A pass in progress when the signal arrives completes before the loop exits.
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                orchestrator.run().await;
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    if engine.in_flight() > 0 {
        tracing::info!("Abandoning {} running analyses", engine.in_flight());
    }
    committer.abort();
    tracing::info!("Worker stopped");
    Ok(())
}
