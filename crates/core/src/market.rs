//! Market edges of the rate graph.

use crate::{Asset, Venue};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum age of a quote before it is treated as unusable.
pub const DEFAULT_FRESHNESS_MS: u64 = 60_000;

/// A directed exchange-rate edge between two assets on one venue.
///
/// `rate` is the multiplicative conversion factor in `to`-units per
/// `from`-unit and is the actually executable side of the book: the bid for
/// a forward edge, the reciprocal of the ask for a reverse edge. At most one
/// market exists per `(from, to, venue)` triple; the graph upserts in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Source asset.
    pub from: Asset,
    /// Target asset.
    pub to: Asset,
    /// Venue the quote came from.
    pub venue: Venue,
    /// Conversion rate, `to`-units per `from`-unit.
    pub rate: Decimal,
    /// Reference price of the underlying instrument.
    pub price: Decimal,
    /// Proportional taker fee of the venue, captured at quote time.
    pub taker_fee: Decimal,
    /// Time of the last quote update (unix ms).
    pub last_update_ms: u64,
}

impl Market {
    /// Create a market edge from a fresh quote.
    pub fn new(
        from: Asset,
        to: Asset,
        venue: Venue,
        rate: Decimal,
        price: Decimal,
        taker_fee: Decimal,
        last_update_ms: u64,
    ) -> Self {
        Self {
            from,
            to,
            venue,
            rate,
            price,
            taker_fee,
            last_update_ms,
        }
    }

    /// Rate after paying the taker fee for a market order on this edge.
    ///
    /// Returns zero when the quote is older than `freshness_ms`: a stale
    /// edge contributes no profitability and drops every cycle through it
    /// from consideration without touching graph state.
    pub fn rate_with_fees(&self, now_ms: u64, freshness_ms: u64) -> Decimal {
        if now_ms.saturating_sub(self.last_update_ms) > freshness_ms {
            return Decimal::ZERO;
        }
        self.rate * (Decimal::ONE - self.taker_fee)
    }

    /// Search weight for negative-cycle detection: `-ln(rate)`.
    ///
    /// The log transform turns "maximize the product of rates" into "find a
    /// negative-weight cycle" so shortest-path machinery applies.
    pub fn weight(&self) -> f64 {
        match self.rate.to_f64() {
            Some(r) if r > 0.0 => -r.ln(),
            _ => f64::INFINITY,
        }
    }

    /// Hop descriptor used in path signatures, e.g. `[USD,EUR]`.
    pub fn instrument(&self) -> String {
        format!("[{},{}]", self.from, self.to)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Market{{{}->{} @{} rate={}}}",
            self.from, self.to, self.venue, self.rate
        )
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn market(rate: &str, fee: &str, last_update_ms: u64) -> Market {
        Market::new(
            Asset::new("USD"),
            Asset::new("EUR"),
            Venue::Simulated,
            rate.parse().unwrap(),
            rate.parse().unwrap(),
            fee.parse().unwrap(),
            last_update_ms,
        )
    }

    #[test]
    fn test_rate_with_fees_applies_taker_fee() {
        let m = market("1.02", "0.002", 1_000);
        let expected: Decimal = "1.02".parse::<Decimal>().unwrap()
            * ("0.998".parse::<Decimal>().unwrap());
        assert_eq!(m.rate_with_fees(1_000, DEFAULT_FRESHNESS_MS), expected);
    }

    #[test]
    fn test_rate_with_fees_zeroes_stale_edge() {
        let m = market("1.02", "0.002", 1_000);
        // 60s + 1ms past the quote: unusable regardless of the stored rate
        let now = 1_000 + DEFAULT_FRESHNESS_MS + 1;
        assert_eq!(m.rate_with_fees(now, DEFAULT_FRESHNESS_MS), Decimal::ZERO);
        // exactly at the window boundary the quote still counts
        let now = 1_000 + DEFAULT_FRESHNESS_MS;
        assert!(m.rate_with_fees(now, DEFAULT_FRESHNESS_MS) > Decimal::ZERO);
    }

    #[test]
    fn test_weight_sign_follows_rate() {
        // rate > 1 compounds a gain, so its weight must be negative
        assert!(market("1.02", "0", 0).weight() < 0.0);
        assert!(market("0.99", "0", 0).weight() > 0.0);
    }

    #[test]
    fn test_weight_of_unusable_rate_is_infinite() {
        let mut m = market("1.02", "0", 0);
        m.rate = Decimal::ZERO;
        assert!(m.weight().is_infinite());
    }

    #[test]
    fn test_instrument_format() {
        let m = market("1.02", "0", 0);
        assert_eq!(m.instrument(), "[USD,EUR]");
    }
}
