//! Hop-cascading market-order executor.
//!
//! Runs a trade chain as a sequence of market orders, feeding the full
//! fee-adjusted output of each fill into the next hop. Any non-executed
//! terminal status aborts the cascade and reports how far it got.

use crate::{ExchangeVenue, ExecutionError, ExecutionResult, OrderStatus, VenueOrder};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use triarb_core::{TradeChain, TradeReport};

/// Tuning for the market-order cascade.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Anchor notional committed to the first hop.
    pub start_amount: Decimal,
    /// Upper bound on the wait for a terminal order status.
    pub order_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            start_amount: Decimal::from(30),
            order_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a fully settled chain execution.
#[derive(Debug, Clone)]
pub struct ChainExecution {
    /// The chain that ran.
    pub chain: TradeChain,
    /// Filled orders, one per hop.
    pub orders: Vec<VenueOrder>,
    /// Anchor balance before the first order.
    pub initial_usd: Decimal,
    /// Anchor balance after the last fill settled.
    pub final_usd: Decimal,
    /// Notional committed to the first hop.
    pub traded_usd: Decimal,
}

impl ChainExecution {
    /// Realized balance multiplier across the whole chain.
    pub fn actual_profitability(&self) -> Decimal {
        if self.initial_usd.is_zero() {
            Decimal::ZERO
        } else {
            self.final_usd / self.initial_usd
        }
    }

    /// Ledger row for this execution.
    pub fn to_report(&self, executor: &str) -> TradeReport {
        let trades: Vec<&str> = self.orders.iter().map(|o| o.order_id.as_str()).collect();
        TradeReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            usd_before: self.initial_usd,
            usd_after: self.final_usd,
            usd_traded: self.traded_usd,
            expected_profitability: self.chain.profitability(),
            actual_profitability: self.actual_profitability(),
            path: self.chain.signature(),
            executor: executor.to_string(),
            trades: trades.join(","),
        }
    }
}

/// Executes trade chains hop by hop with market orders.
pub struct MarketTradeExecutor<V> {
    venue: Arc<V>,
    config: ExecutorConfig,
}

impl<V: ExchangeVenue> MarketTradeExecutor<V> {
    /// Name recorded in trade reports.
    pub const NAME: &'static str = "market-cascade";

    pub fn new(venue: Arc<V>, config: ExecutorConfig) -> Self {
        Self { venue, config }
    }

    pub fn venue(&self) -> &Arc<V> {
        &self.venue
    }

    /// Run the chain to completion.
    ///
    /// Trade direction per hop follows the venue's listings: a listed
    /// `from/to` pair is sold directly (negative base amount), otherwise the
    /// reverse instrument is bought with the carried amount converted at the
    /// edge's reference price.
    pub async fn execute(&self, chain: &TradeChain) -> ExecutionResult<ChainExecution> {
        let Some(first) = chain.edges().first() else {
            return Err(ExecutionError::Rejected("empty trade chain".into()));
        };
        let anchor = first.from.clone();
        let initial_usd = self.venue.balance(&anchor).await?;
        let traded_usd = self.config.start_amount;

        let total = chain.hops();
        let mut orders: Vec<VenueOrder> = Vec::with_capacity(total);
        let mut amount = traded_usd;
        for (i, market) in chain.edges().iter().enumerate() {
            let signed = if self.venue.lists_pair(&market.from, &market.to) {
                -amount
            } else {
                if market.price <= Decimal::ZERO {
                    return Err(ExecutionError::Rejected(format!(
                        "unusable reference price on {}",
                        market.instrument()
                    )));
                }
                amount / market.price
            };
            debug!(
                hop = i + 1,
                total,
                instrument = %market.instrument(),
                amount = %signed,
                "placing market order"
            );
            let order = timeout(
                self.config.order_timeout,
                self.venue.trade_market_order(market, signed),
            )
            .await
            .map_err(|_| ExecutionError::Timeout(self.config.order_timeout))??;

            match order.status {
                OrderStatus::Executed => {
                    amount = (Decimal::ONE - self.venue.taker_fee()) * order.realized_amount();
                    orders.push(order);
                }
                status => {
                    return Err(ExecutionError::OrderFailed {
                        hop: i + 1,
                        total,
                        reason: status.to_string(),
                        executed: orders.len(),
                    });
                }
            }
        }

        let final_usd = self.venue.balance(&anchor).await?;
        Ok(ChainExecution {
            chain: chain.clone(),
            orders,
            initial_usd,
            final_usd,
            traded_usd,
        })
    }
}
