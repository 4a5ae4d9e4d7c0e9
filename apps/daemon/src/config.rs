//! Application configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use triarb_core::Asset;
use triarb_engine::{DetectionStrategy, GraphConfig, PipelineConfig};
use triarb_executor::{ExecutorConfig, ManagerConfig};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Detection configuration.
    pub detector: DetectorSettings,
    /// Execution configuration.
    pub execution: ExecutionSettings,
    /// Report ledger configuration.
    pub ledger: LedgerSettings,
    /// Logging level.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            execution: ExecutionSettings::default(),
            ledger: LedgerSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

/// How a configuration load went. Loading happens before the logging
/// subscriber is up (the config decides the log level), so the outcome is
/// reported back for the caller to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Config file parsed.
    Loaded,
    /// No file at the given path; defaults in effect.
    Missing,
    /// File present but unparseable; defaults in effect.
    Invalid(String),
}

impl AppConfig {
    /// Load the config file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load(path: &str) -> (Self, LoadStatus) {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => (config, LoadStatus::Loaded),
                Err(e) => (Self::default(), LoadStatus::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), LoadStatus::Missing),
        }
    }
}

/// Detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Asset every reported cycle must pass through.
    pub anchor: String,
    /// Minimum cycle length.
    pub min_hops: usize,
    /// Maximum cycle length.
    pub max_hops: usize,
    /// Maximum quote age in milliseconds.
    pub freshness_ms: u64,
    /// Assets excluded from cycle search.
    pub blacklist: Vec<String>,
    /// Cycle search strategy: `simple-cycles` or `bellman-ford`.
    pub strategy: String,
    /// Debounce window for detection triggers, in milliseconds.
    pub debounce_ms: u64,
    /// Hard bound on trigger accumulation, in milliseconds.
    pub max_accumulate_ms: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        let graph = GraphConfig::default();
        let pipeline = PipelineConfig::default();
        Self {
            anchor: graph.anchor.to_string(),
            min_hops: graph.min_hops,
            max_hops: graph.max_hops,
            freshness_ms: graph.freshness_ms,
            blacklist: graph.blacklist.iter().map(|a| a.to_string()).collect(),
            strategy: "simple-cycles".to_string(),
            debounce_ms: pipeline.debounce.as_millis() as u64,
            max_accumulate_ms: pipeline.max_accumulate.as_millis() as u64,
        }
    }
}

impl From<&DetectorSettings> for GraphConfig {
    fn from(settings: &DetectorSettings) -> Self {
        GraphConfig {
            anchor: Asset::new(&settings.anchor),
            min_hops: settings.min_hops,
            max_hops: settings.max_hops,
            freshness_ms: settings.freshness_ms,
            blacklist: settings.blacklist.iter().map(|s| Asset::new(s)).collect(),
            strategy: parse_strategy(&settings.strategy),
        }
    }
}

impl From<&DetectorSettings> for PipelineConfig {
    fn from(settings: &DetectorSettings) -> Self {
        PipelineConfig {
            debounce: Duration::from_millis(settings.debounce_ms),
            max_accumulate: Duration::from_millis(settings.max_accumulate_ms),
            ..PipelineConfig::default()
        }
    }
}

pub fn parse_strategy(strategy: &str) -> DetectionStrategy {
    match strategy.to_lowercase().as_str() {
        "bellman-ford" => DetectionStrategy::BellmanFord,
        _ => DetectionStrategy::SimpleCycles,
    }
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Total chain executions allowed before shutdown.
    pub trade_budget: u32,
    /// Anchor notional committed to each chain.
    pub start_amount_usd: Decimal,
    /// Minimum profitability any chain must clear.
    pub threshold_floor: Decimal,
    /// Anchor-balance drawdown that halts the engine.
    pub loss_cap_usd: Decimal,
    /// Past reports per path feeding the adaptive threshold.
    pub history_window: usize,
    /// Order fill wait bound, in seconds.
    pub order_timeout_secs: u64,
    /// Simulated venue taker fee.
    pub taker_fee: Decimal,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        let executor = ExecutorConfig::default();
        Self {
            trade_budget: manager.trade_budget,
            start_amount_usd: executor.start_amount,
            threshold_floor: manager.threshold_floor,
            loss_cap_usd: manager.loss_cap,
            history_window: manager.history_window,
            order_timeout_secs: executor.order_timeout.as_secs(),
            taker_fee: Decimal::new(2, 3),
        }
    }
}

impl ExecutionSettings {
    pub fn manager_config(&self, anchor: &str) -> ManagerConfig {
        ManagerConfig {
            anchor: Asset::new(anchor),
            trade_budget: self.trade_budget,
            threshold_floor: self.threshold_floor,
            loss_cap: self.loss_cap_usd,
            history_window: self.history_window,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            start_amount: self.start_amount_usd,
            order_timeout: Duration::from_secs(self.order_timeout_secs),
        }
    }
}

/// Report ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// SQLite database URL.
    pub database_url: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:triarb.db".to_string(),
        }
    }
}
