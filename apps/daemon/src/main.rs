//! Triangular arbitrage daemon.
//!
//! Wires the simulated market feed into the rate graph, runs the debounced
//! detection pipeline over it, and hands every best chain to the decision
//! engine until the trade budget runs out or the drawdown breaker trips.

mod config;
mod sim;

use clap::Parser;
use config::{AppConfig, LoadStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use triarb_engine::{DetectionPipeline, GraphConfig, PipelineConfig, RateGraph};
use triarb_executor::{AssetsManager, Decision, MarketTradeExecutor};
use triarb_ledger::SqliteLedger;

/// Triangular arbitrage daemon CLI.
#[derive(Parser, Debug)]
#[command(name = "triarb")]
#[command(about = "Triangular crypto arbitrage daemon", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Trade budget override
    #[arg(short, long)]
    trades: Option<u32>,

    /// SQLite database URL override
    #[arg(long)]
    db: Option<String>,

    /// Log level override: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// Simulator tick interval in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (mut config, load_status) = AppConfig::load(&args.config);
    if let Some(trades) = args.trades {
        config.execution.trade_budget = trades;
    }
    if let Some(db) = args.db {
        config.ledger.database_url = db;
    }

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level);
    match load_status {
        LoadStatus::Loaded => info!(path = %args.config, "loaded configuration file"),
        LoadStatus::Missing => info!(path = %args.config, "no configuration file, using defaults"),
        LoadStatus::Invalid(reason) => {
            warn!(path = %args.config, error = %reason, "bad configuration file, using defaults")
        }
    }

    info!("starting triangular arbitrage daemon");
    info!(
        anchor = %config.detector.anchor,
        strategy = %config.detector.strategy,
        trade_budget = config.execution.trade_budget,
        start_amount = %config.execution.start_amount_usd,
        db = %config.ledger.database_url,
        "configuration"
    );

    let ledger = match SqliteLedger::connect(&config.ledger.database_url).await {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            error!(error = %e, "failed to open report ledger");
            return;
        }
    };

    let graph = Arc::new(RateGraph::new(GraphConfig::from(&config.detector)));
    let venue = Arc::new(sim::SimulatedVenue::new(
        config.execution.taker_fee,
        config.execution.start_amount_usd * rust_decimal::Decimal::from(100),
    ));
    let executor = MarketTradeExecutor::new(venue.clone(), config.execution.executor_config());
    let manager = Arc::new(AssetsManager::new(
        executor,
        ledger,
        config.execution.manager_config(&config.detector.anchor),
    ));

    let pipeline = DetectionPipeline::new(graph.clone(), PipelineConfig::from(&config.detector));
    let stats = pipeline.stats();
    let (sink, chains) = pipeline.start();
    let mut best_chains = chains.subscribe();

    let feed = tokio::spawn(sim::run_market_simulator(
        venue,
        graph,
        sink,
        Duration::from_millis(args.tick_ms),
    ));

    info!("Press Ctrl+C to stop...");
    loop {
        tokio::select! {
            received = best_chains.recv() => match received {
                Ok(chain) => match manager.handle_best_trade(&chain).await {
                    Decision::Shutdown => {
                        info!("trade budget spent, shutting down");
                        break;
                    }
                    Decision::Halted => {
                        error!("drawdown breaker tripped, shutting down");
                        break;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "fell behind the detection stream");
                }
                Err(RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for Ctrl+C");
                }
                warn!("shutdown signal received");
                break;
            }
        }
    }

    feed.abort();
    info!(
        ticks = stats.received.load(std::sync::atomic::Ordering::Relaxed),
        dropped = stats.dropped.load(std::sync::atomic::Ordering::Relaxed),
        detections = stats.detections.load(std::sync::atomic::Ordering::Relaxed),
        chains = stats.emitted.load(std::sync::atomic::Ordering::Relaxed),
        trades_left = manager.trades_left().await,
        "daemon stopped"
    );
}
