//! Execution decision engine.
//!
//! Sits between detection and the order cascade: rotates detected chains to
//! the anchor asset, filters them through an adaptive profitability
//! threshold, enforces the trade budget, and halts the whole engine when
//! realized losses breach the drawdown cap.

use crate::{ChainExecution, ExchangeVenue, MarketTradeExecutor};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use triarb_core::{Asset, ReportStore, StoreError, TradeChain, TradeReport};

/// Tuning for the decision engine.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Asset every executed chain must start and end in.
    pub anchor: Asset,
    /// Total number of chain executions allowed before shutdown.
    pub trade_budget: u32,
    /// Minimum profitability any chain must clear, regardless of history.
    pub threshold_floor: Decimal,
    /// Maximum tolerated anchor-balance drawdown before halting.
    pub loss_cap: Decimal,
    /// How many past reports per path feed the adaptive threshold.
    pub history_window: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            anchor: Asset::usd(),
            trade_budget: 30,
            threshold_floor: Decimal::new(1001, 3),
            loss_cap: Decimal::TEN,
            history_window: 5,
        }
    }
}

/// What the engine decided to do with a detected chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Chain ran to completion and was recorded.
    Executed,
    /// Chain did not qualify (wrong anchor or below threshold).
    Rejected,
    /// Transient venue condition, opportunity passed over.
    Skipped,
    /// Execution started and failed.
    Failed,
    /// Trade budget exhausted, no further chains will run.
    Shutdown,
    /// Drawdown circuit breaker has tripped.
    Halted,
}

#[derive(Debug)]
struct ManagerState {
    trades_left: u32,
    baseline_usd: Option<Decimal>,
    last_usd: Option<Decimal>,
    halted: bool,
}

/// Decides which detected chains actually trade.
pub struct AssetsManager<V, S> {
    executor: MarketTradeExecutor<V>,
    store: Arc<S>,
    config: ManagerConfig,
    state: Mutex<ManagerState>,
}

impl<V: ExchangeVenue, S: ReportStore> AssetsManager<V, S> {
    pub fn new(executor: MarketTradeExecutor<V>, store: Arc<S>, config: ManagerConfig) -> Self {
        let state = ManagerState {
            trades_left: config.trade_budget,
            baseline_usd: None,
            last_usd: None,
            halted: false,
        };
        Self {
            executor,
            store,
            config,
            state: Mutex::new(state),
        }
    }

    /// Remaining executions before shutdown.
    pub async fn trades_left(&self) -> u32 {
        self.state.lock().await.trades_left
    }

    /// Whether the drawdown breaker has tripped.
    pub async fn is_halted(&self) -> bool {
        self.state.lock().await.halted
    }

    /// Profitability a chain on this path must clear right now.
    ///
    /// Corrects the graph-implied estimate for systematic optimism: with a
    /// recent history of reports on the same path, the threshold is
    /// `mean(expected) - mean(actual) + 1`, never below the configured
    /// floor. With no history both means default to one, which leaves the
    /// floor in charge.
    pub async fn adaptive_threshold(&self, path: &str) -> Result<Decimal, StoreError> {
        let history = self
            .store
            .recent_for_path(path, self.config.history_window)
            .await?;
        let (mean_expected, mean_actual) = if history.is_empty() {
            (Decimal::ONE, Decimal::ONE)
        } else {
            let n = Decimal::from(history.len() as u64);
            let expected: Decimal = history.iter().map(|r| r.expected_profitability).sum();
            let actual: Decimal = history.iter().map(|r| r.actual_profitability).sum();
            (expected / n, actual / n)
        };
        let corrected = mean_expected - mean_actual + Decimal::ONE;
        Ok(corrected.max(self.config.threshold_floor))
    }

    /// Process the best chain from one detection pass.
    ///
    /// Holds the engine lock across execution, so chains run strictly one
    /// at a time.
    pub async fn handle_best_trade(&self, chain: &TradeChain) -> Decision {
        let mut state = self.state.lock().await;
        if state.halted {
            return Decision::Halted;
        }
        if state.trades_left == 0 {
            info!("trade budget exhausted, shutting down executions");
            return Decision::Shutdown;
        }

        let Some(anchored) = chain.rotate_to(&self.config.anchor) else {
            debug!(
                anchor = %self.config.anchor,
                path = %chain.signature(),
                "chain skips the anchor asset, rejected"
            );
            return Decision::Rejected;
        };

        let path = anchored.signature();
        let threshold = match self.adaptive_threshold(&path).await {
            Ok(threshold) => threshold,
            Err(e) => {
                error!(error = %e, "report history unavailable, rejecting chain");
                return Decision::Rejected;
            }
        };
        if anchored.profitability() < threshold {
            debug!(
                profitability = %anchored.profitability(),
                threshold = %threshold,
                path = %path,
                "below adaptive threshold, rejected"
            );
            return Decision::Rejected;
        }

        info!(
            profitability = %anchored.profitability(),
            threshold = %threshold,
            trades_left = state.trades_left,
            path = %anchored.illustrate(),
            "executing trade chain"
        );
        let execution = match self.executor.execute(&anchored).await {
            Ok(execution) => execution,
            Err(e) if e.is_skippable() => {
                debug!(error = %e, "opportunity skipped");
                return Decision::Skipped;
            }
            Err(e) => {
                error!(error = %e, path = %path, "chain execution failed");
                return Decision::Failed;
            }
        };

        let report = execution.to_report(MarketTradeExecutor::<V>::NAME);
        if let Err(e) = self.store.append(&report).await {
            // the trade already settled; a ledger failure must not hide it
            error!(error = %e, "failed to persist trade report");
        }
        log_report(&report);

        state.trades_left -= 1;
        if state.baseline_usd.is_none() {
            state.baseline_usd = Some(execution.initial_usd);
        }
        state.last_usd = Some(execution.final_usd);
        if self.breached_loss_cap(&state, &execution) {
            state.halted = true;
            error!(
                baseline = %state.baseline_usd.unwrap_or_default(),
                last = %execution.final_usd,
                loss_cap = %self.config.loss_cap,
                "drawdown cap breached, halting all executions"
            );
            return Decision::Halted;
        }
        Decision::Executed
    }

    fn breached_loss_cap(&self, state: &ManagerState, execution: &ChainExecution) -> bool {
        match state.baseline_usd {
            Some(baseline) => execution.final_usd <= baseline - self.config.loss_cap,
            None => false,
        }
    }
}

fn log_report(report: &TradeReport) {
    info!(
        usd_before = %report.usd_before,
        usd_after = %report.usd_after,
        usd_traded = %report.usd_traded,
        expected = %report.expected_profitability,
        actual = %report.actual_profitability,
        path = %report.path,
        trades = %report.trades,
        "trade report"
    );
    if report.actual_profitability < report.expected_profitability {
        warn!(
            slippage = %(report.expected_profitability - report.actual_profitability),
            "realized profitability fell short of the estimate"
        );
    }
}
