//! Venue port: the surface a trade executor needs from an exchange.

use crate::{ExecutionError, ExecutionResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use triarb_core::{Asset, Market};

/// Terminal status of a venue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Fully filled.
    Executed,
    /// Canceled before a full fill.
    Canceled,
    /// Failed at the venue.
    Error,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A settled market order as reported back by a venue.
///
/// `amount_at_creation` keeps the venue's sign convention: positive buys
/// base units, negative sells them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrder {
    /// Venue-assigned order id.
    pub order_id: String,
    /// Terminal status.
    pub status: OrderStatus,
    /// Signed base amount the order was created with.
    pub amount_at_creation: Decimal,
    /// Average fill price.
    pub avg_price: Decimal,
}

impl VenueOrder {
    /// Gross units of the target asset this fill produced, before fees.
    ///
    /// A sell (negative creation amount) yields quote units, `-amount *
    /// avg_price`; a buy yields the base units it was created for.
    pub fn realized_amount(&self) -> Decimal {
        if self.amount_at_creation < Decimal::ZERO {
            -self.amount_at_creation * self.avg_price
        } else {
            self.amount_at_creation
        }
    }
}

/// The slice of an exchange the executor depends on.
#[async_trait]
pub trait ExchangeVenue: Send + Sync {
    /// Venue name for logs and reports.
    fn name(&self) -> &str;

    /// Proportional taker fee charged on market orders.
    fn taker_fee(&self) -> Decimal;

    /// Whether the venue lists `base/quote` as a direct instrument.
    ///
    /// Decides trade direction on an edge: a listed pair is sold directly,
    /// an unlisted one is entered by buying the reverse instrument.
    fn lists_pair(&self, base: &Asset, quote: &Asset) -> bool;

    /// Current free balance of the given asset.
    async fn balance(&self, asset: &Asset) -> ExecutionResult<Decimal>;

    /// Place a market order on the given edge and wait for a terminal
    /// status. `amount` is signed per `VenueOrder::amount_at_creation`.
    async fn trade_market_order(
        &self,
        market: &Market,
        amount: Decimal,
    ) -> ExecutionResult<VenueOrder>;
}

/// Scripted venue for executor tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a queue of scripted order outcomes and records every call.
    pub struct MockVenue {
        taker_fee: Decimal,
        listed: Vec<(Asset, Asset)>,
        balances: Mutex<HashMap<Asset, Decimal>>,
        balance_script: Mutex<VecDeque<Decimal>>,
        outcomes: Mutex<VecDeque<ExecutionResult<VenueOrder>>>,
        calls: Mutex<Vec<(String, Decimal)>>,
    }

    impl MockVenue {
        pub fn new(taker_fee: Decimal) -> Self {
            Self {
                taker_fee,
                listed: Vec::new(),
                balances: Mutex::new(HashMap::new()),
                balance_script: Mutex::new(VecDeque::new()),
                outcomes: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_listed_pair(mut self, base: &str, quote: &str) -> Self {
            self.listed.push((Asset::new(base), Asset::new(quote)));
            self
        }

        pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
            self.balances
                .lock()
                .unwrap()
                .insert(Asset::new(asset), amount);
            self
        }

        pub fn push_outcome(&self, outcome: ExecutionResult<VenueOrder>) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn push_fill(&self, order_id: &str, amount: Decimal, avg_price: Decimal) {
            self.push_outcome(Ok(VenueOrder {
                order_id: order_id.to_string(),
                status: OrderStatus::Executed,
                amount_at_creation: amount,
                avg_price,
            }));
        }

        /// Queue a balance to return from the next `balance` call, ahead of
        /// the static balance map.
        pub fn push_balance(&self, amount: Decimal) {
            self.balance_script.lock().unwrap().push_back(amount);
        }

        pub fn set_balance(&self, asset: &str, amount: Decimal) {
            self.balances
                .lock()
                .unwrap()
                .insert(Asset::new(asset), amount);
        }

        /// Instruments and amounts of every order placed, in call order.
        pub fn calls(&self) -> Vec<(String, Decimal)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExchangeVenue for MockVenue {
        fn name(&self) -> &str {
            "mock"
        }

        fn taker_fee(&self) -> Decimal {
            self.taker_fee
        }

        fn lists_pair(&self, base: &Asset, quote: &Asset) -> bool {
            self.listed.iter().any(|(b, q)| b == base && q == quote)
        }

        async fn balance(&self, asset: &Asset) -> ExecutionResult<Decimal> {
            if let Some(scripted) = self.balance_script.lock().unwrap().pop_front() {
                return Ok(scripted);
            }
            Ok(self
                .balances
                .lock()
                .unwrap()
                .get(asset)
                .copied()
                .unwrap_or(Decimal::ZERO))
        }

        async fn trade_market_order(
            &self,
            market: &Market,
            amount: Decimal,
        ) -> ExecutionResult<VenueOrder> {
            self.calls
                .lock()
                .unwrap()
                .push((market.instrument(), amount));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ExecutionError::Venue("no scripted outcome".into())))
        }
    }
}
