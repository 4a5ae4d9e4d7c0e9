//! Trade chains: closed cycles of market edges.

use crate::{Asset, Market};
use rust_decimal::Decimal;
use std::fmt;

/// An immutable, ordered cycle of markets returning to its starting asset.
///
/// The edges are frozen snapshot copies taken under the graph lock, so the
/// profitability computed at construction stays valid even while the live
/// graph keeps mutating underneath.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeChain {
    edges: Vec<Market>,
    profitability: Decimal,
}

impl TradeChain {
    /// Build a chain from a snapshot of cycle edges and cache its
    /// profitability: the product of `rate_with_fees` over all edges.
    ///
    /// An empty snapshot has zero profitability.
    pub fn from_snapshot(edges: Vec<Market>, now_ms: u64, freshness_ms: u64) -> Self {
        debug_assert!(Self::is_closed(&edges), "trade chain must close its cycle");
        let profitability = if edges.is_empty() {
            Decimal::ZERO
        } else {
            edges
                .iter()
                .map(|m| m.rate_with_fees(now_ms, freshness_ms))
                .product()
        };
        Self {
            edges,
            profitability,
        }
    }

    fn is_closed(edges: &[Market]) -> bool {
        edges.windows(2).all(|w| w[0].to == w[1].from)
            && match (edges.first(), edges.last()) {
                (Some(first), Some(last)) => last.to == first.from,
                _ => true,
            }
    }

    /// The cycle's edges in trade order.
    pub fn edges(&self) -> &[Market] {
        &self.edges
    }

    /// Compounded profitability after fees, as a multiplier (e.g. 1.001).
    pub fn profitability(&self) -> Decimal {
        self.profitability
    }

    /// Number of hops in the cycle.
    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    /// Whether the cycle passes through the given asset.
    pub fn contains(&self, asset: &Asset) -> bool {
        self.edges.iter().any(|m| &m.from == asset)
    }

    /// Rotate the cycle so it starts at `anchor`, or `None` when the cycle
    /// never touches the anchor. Profitability is rotation-invariant and is
    /// carried over unchanged.
    pub fn rotate_to(&self, anchor: &Asset) -> Option<TradeChain> {
        let start = self.edges.iter().position(|m| &m.from == anchor)?;
        let mut edges = Vec::with_capacity(self.edges.len());
        edges.extend_from_slice(&self.edges[start..]);
        edges.extend_from_slice(&self.edges[..start]);
        Some(TradeChain {
            edges,
            profitability: self.profitability,
        })
    }

    /// Ordered hop descriptors identifying this path, used to group
    /// execution history, e.g. `[USD,EUR][EUR,BTC][BTC,USD]`.
    pub fn signature(&self) -> String {
        self.edges.iter().map(|m| m.instrument()).collect()
    }

    /// Human-readable path summary for logs and reports.
    pub fn illustrate(&self) -> String {
        let instruments: Vec<String> = self.edges.iter().map(|m| m.instrument()).collect();
        format!(
            "{{Trades: number: {}, instruments: [{}]}}",
            self.hops(),
            instruments.join(", ")
        )
    }
}

impl fmt::Display for TradeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TradeChain{{profit: {}, path: {}}}",
            self.profitability,
            self.illustrate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Venue, DEFAULT_FRESHNESS_MS};
    use pretty_assertions::assert_eq;

    fn edge(from: &str, to: &str, rate: &str, fee: &str) -> Market {
        Market::new(
            Asset::new(from),
            Asset::new(to),
            Venue::Simulated,
            rate.parse().unwrap(),
            rate.parse().unwrap(),
            fee.parse().unwrap(),
            1_000,
        )
    }

    fn chain(edges: Vec<Market>) -> TradeChain {
        TradeChain::from_snapshot(edges, 1_000, DEFAULT_FRESHNESS_MS)
    }

    #[test]
    fn test_profitability_is_exact_product_of_fee_adjusted_rates() {
        let c = chain(vec![
            edge("USD", "EUR", "1.02", "0.002"),
            edge("EUR", "BTC", "0.99", "0.002"),
            edge("BTC", "USD", "0.995", "0.002"),
        ]);
        let f: Decimal = "0.998".parse().unwrap();
        let expected = ("1.02".parse::<Decimal>().unwrap() * f)
            * ("0.99".parse::<Decimal>().unwrap() * f)
            * ("0.995".parse::<Decimal>().unwrap() * f);
        assert_eq!(c.profitability(), expected);
    }

    #[test]
    fn test_profitability_zero_for_empty_chain() {
        assert_eq!(chain(vec![]).profitability(), Decimal::ZERO);
    }

    #[test]
    fn test_stale_edge_zeroes_whole_chain() {
        let mut stale = edge("EUR", "BTC", "0.99", "0");
        stale.last_update_ms = 0;
        let c = TradeChain::from_snapshot(
            vec![edge("USD", "EUR", "1.02", "0"), stale, edge("BTC", "USD", "44000", "0")],
            DEFAULT_FRESHNESS_MS + 1_000,
            DEFAULT_FRESHNESS_MS,
        );
        assert_eq!(c.profitability(), Decimal::ZERO);
    }

    #[test]
    fn test_rotate_to_anchor() {
        let c = chain(vec![
            edge("EUR", "BTC", "1", "0"),
            edge("BTC", "USD", "1", "0"),
            edge("USD", "EUR", "1", "0"),
        ]);
        let rotated = c.rotate_to(&Asset::usd()).unwrap();
        let hops: Vec<(String, String)> = rotated
            .edges()
            .iter()
            .map(|m| (m.from.to_string(), m.to.to_string()))
            .collect();
        assert_eq!(
            hops,
            vec![
                ("USD".to_string(), "EUR".to_string()),
                ("EUR".to_string(), "BTC".to_string()),
                ("BTC".to_string(), "USD".to_string()),
            ]
        );
        assert_eq!(rotated.profitability(), c.profitability());
    }

    #[test]
    fn test_rotate_to_missing_anchor_is_none() {
        let c = chain(vec![
            edge("EUR", "BTC", "1", "0"),
            edge("BTC", "EUR", "1", "0"),
        ]);
        assert!(c.rotate_to(&Asset::usd()).is_none());
    }

    #[test]
    fn test_signature_and_illustrate() {
        let c = chain(vec![
            edge("USD", "EUR", "1", "0"),
            edge("EUR", "USD", "1", "0"),
        ]);
        assert_eq!(c.signature(), "[USD,EUR][EUR,USD]");
        assert_eq!(
            c.illustrate(),
            "{Trades: number: 2, instruments: [[USD,EUR], [EUR,USD]]}"
        );
    }

    #[test]
    fn test_contains() {
        let c = chain(vec![
            edge("USD", "EUR", "1", "0"),
            edge("EUR", "USD", "1", "0"),
        ]);
        assert!(c.contains(&Asset::new("EUR")));
        assert!(!c.contains(&Asset::new("BTC")));
    }
}
