//! Simulated exchange venue and its price feed.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use triarb_core::{current_time_ms, Asset, Market, Venue};
use triarb_engine::{RateGraph, TickSink};
use triarb_executor::{ExchangeVenue, ExecutionError, ExecutionResult, OrderStatus, VenueOrder};

/// Instruments the simulated venue lists, with their base prices.
const INSTRUMENTS: &[(&str, &str, f64)] = &[
    ("BTC", "USD", 45_000.0),
    ("ETH", "USD", 3_000.0),
    ("ETH", "BTC", 0.0667),
    ("LEO", "USD", 5.0),
];

/// In-process exchange: instant synthetic fills against its own book.
pub struct SimulatedVenue {
    taker_fee: Decimal,
    balances: Mutex<HashMap<Asset, Decimal>>,
    book: Mutex<HashMap<(Asset, Asset), Decimal>>,
    busy: AtomicBool,
    order_seq: AtomicU64,
}

impl SimulatedVenue {
    pub fn new(taker_fee: Decimal, starting_usd: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(Asset::usd(), starting_usd);
        Self {
            taker_fee,
            balances: Mutex::new(balances),
            book: Mutex::new(HashMap::new()),
            busy: AtomicBool::new(false),
            order_seq: AtomicU64::new(0),
        }
    }

    fn set_price(&self, base: &Asset, quote: &Asset, price: Decimal) {
        self.book
            .lock()
            .unwrap()
            .insert((base.clone(), quote.clone()), price);
    }

    fn fill_price(&self, market: &Market) -> Decimal {
        let book = self.book.lock().unwrap();
        book.get(&(market.from.clone(), market.to.clone()))
            .or_else(|| book.get(&(market.to.clone(), market.from.clone())))
            .copied()
            .unwrap_or(market.price)
    }

    fn credit(&self, balances: &mut HashMap<Asset, Decimal>, asset: &Asset, amount: Decimal) {
        *balances.entry(asset.clone()).or_insert(Decimal::ZERO) += amount;
    }
}

#[async_trait]
impl ExchangeVenue for SimulatedVenue {
    fn name(&self) -> &str {
        Venue::Simulated.as_str()
    }

    fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn lists_pair(&self, base: &Asset, quote: &Asset) -> bool {
        INSTRUMENTS
            .iter()
            .any(|(b, q, _)| base.as_str() == *b && quote.as_str() == *q)
    }

    async fn balance(&self, asset: &Asset) -> ExecutionResult<Decimal> {
        Ok(self
            .balances
            .lock()
            .map_err(|e| ExecutionError::Venue(e.to_string()))?
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn trade_market_order(
        &self,
        market: &Market,
        amount: Decimal,
    ) -> ExecutionResult<VenueOrder> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(ExecutionError::VenueBusy);
        }
        let result = self.fill(market, amount);
        self.busy.store(false, Ordering::Release);
        result
    }
}

impl SimulatedVenue {
    fn fill(&self, market: &Market, amount: Decimal) -> ExecutionResult<VenueOrder> {
        if amount.is_zero() {
            return Err(ExecutionError::Rejected("zero amount".into()));
        }
        let avg_price = self.fill_price(market);
        let mut balances = self
            .balances
            .lock()
            .map_err(|e| ExecutionError::Venue(e.to_string()))?;
        let net = Decimal::ONE - self.taker_fee;
        if amount < Decimal::ZERO {
            // sell `from` units, receive quote
            self.credit(&mut balances, &market.from, amount);
            self.credit(&mut balances, &market.to, -amount * avg_price * net);
        } else {
            // buy `to` units, pay in `from`
            self.credit(&mut balances, &market.from, -amount * avg_price);
            self.credit(&mut balances, &market.to, amount * net);
        }
        let order_id = format!("sim-{}", self.order_seq.fetch_add(1, Ordering::Relaxed));
        Ok(VenueOrder {
            order_id,
            status: OrderStatus::Executed,
            amount_at_creation: amount,
            avg_price,
        })
    }
}

/// Drive the venue's book and the rate graph with deterministic sine-walk
/// prices, notifying the pipeline on every instrument tick.
///
/// Each tick writes both directions of the instrument: the bid as the
/// forward edge and the reciprocal of the ask as the reverse edge.
pub async fn run_market_simulator(
    venue: Arc<SimulatedVenue>,
    graph: Arc<RateGraph>,
    sink: TickSink,
    tick_interval: Duration,
) {
    info!("starting simulated market feed");
    let fee = venue.taker_fee();
    let mut counter = 0u64;
    loop {
        for (idx, (base, quote, base_price)) in INSTRUMENTS.iter().enumerate() {
            // per-instrument phase offsets keep cross rates drifting out of
            // line with each other, opening occasional triangles
            let phase = counter as f64 * (0.0007 + idx as f64 * 0.0002);
            let mid = base_price * (1.0 + phase.sin() * 0.004);
            let spread = mid * 0.0005;
            let bid = mid - spread;
            let ask = mid + spread;

            let base = Asset::new(base);
            let quote = Asset::new(quote);
            let now_ms = current_time_ms();
            let bid_dec = Decimal::from_f64(bid).unwrap_or_default();
            let ask_dec = Decimal::from_f64(ask).unwrap_or_default();
            let rev_rate = if ask > 0.0 {
                Decimal::from_f64(1.0 / ask).unwrap_or_default()
            } else {
                Decimal::ZERO
            };

            venue.set_price(&base, &quote, Decimal::from_f64(mid).unwrap_or_default());
            graph.upsert(Market::new(
                base.clone(),
                quote.clone(),
                Venue::Simulated,
                bid_dec,
                bid_dec,
                fee,
                now_ms,
            ));
            graph.upsert(Market::new(
                quote.clone(),
                base.clone(),
                Venue::Simulated,
                rev_rate,
                ask_dec,
                fee,
                now_ms,
            ));
            sink.notify(&format!("{base}/{quote}"));
        }
        counter += 1;
        tokio::time::sleep(tick_interval).await;
    }
}
