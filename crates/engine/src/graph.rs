//! Concurrent rate graph and cycle detection.
//!
//! One mutex guards the whole adjacency structure: every upsert and every
//! detection pass runs under it end-to-end, so a detection pass always sees
//! a self-consistent snapshot of rates.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::warn;
use triarb_core::{current_time_ms, Asset, Market, TradeChain, DEFAULT_FRESHNESS_MS};

type Adjacency = BTreeMap<Asset, Vec<Market>>;

/// How the graph searches for profitable cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    /// Bounded enumeration of simple cycles (default).
    SimpleCycles,
    /// Shortest-path relaxation: a relaxable edge after V-1 rounds marks a
    /// negative-weight cycle, i.e. rates compounding above 1.
    BellmanFord,
}

/// Configuration for the rate graph and its cycle search.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Cycles must pass through this asset to be tradeable.
    pub anchor: Asset,
    /// Minimum cycle length considered.
    pub min_hops: usize,
    /// Maximum cycle length considered; bounds the enumeration on a dense
    /// multigraph.
    pub max_hops: usize,
    /// Quote age beyond which an edge contributes zero profitability.
    pub freshness_ms: u64,
    /// Illiquid or administrative assets excluded from every cycle.
    pub blacklist: Vec<Asset>,
    /// Cycle search strategy.
    pub strategy: DetectionStrategy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            anchor: Asset::usd(),
            min_hops: 3,
            max_hops: 4,
            freshness_ms: DEFAULT_FRESHNESS_MS,
            blacklist: vec![Asset::new("LEO")],
            strategy: DetectionStrategy::SimpleCycles,
        }
    }
}

impl GraphConfig {
    fn blacklisted(&self, asset: &Asset) -> bool {
        self.blacklist.contains(asset)
    }
}

/// Mutex-guarded directed weighted multigraph of exchange rates.
///
/// Vertices are asset symbols; edges are [`Market`] quotes keyed by
/// `(from, to, venue)`. Edges are created on first sighting and upserted in
/// place afterwards, never deleted — staleness zeroes them out instead.
#[derive(Debug)]
pub struct RateGraph {
    config: GraphConfig,
    adjacency: Mutex<Adjacency>,
}

impl RateGraph {
    /// Create an empty graph.
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            adjacency: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Upsert the edge for `(from, to, venue)` with a fresh quote.
    ///
    /// Registers both vertices implicitly on first sighting. Always succeeds
    /// for a positive rate and price; degraded quotes are dropped with a
    /// warning.
    pub fn upsert(&self, update: Market) {
        if update.rate <= Decimal::ZERO || update.price <= Decimal::ZERO {
            warn!(market = %update, "ignoring quote with non-positive rate or price");
            return;
        }

        let mut adj = self.lock();
        adj.entry(update.to.clone()).or_default();
        let outgoing = adj.entry(update.from.clone()).or_default();
        match outgoing
            .iter_mut()
            .find(|m| m.to == update.to && m.venue == update.venue)
        {
            Some(market) => {
                market.rate = update.rate;
                market.price = update.price;
                market.taker_fee = update.taker_fee;
                market.last_update_ms = update.last_update_ms;
            }
            None => outgoing.push(update),
        }
    }

    /// Number of distinct assets seen.
    pub fn vertex_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of distinct `(from, to, venue)` edges.
    pub fn edge_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// All candidate cycles under the configured strategy: bounded in hop
    /// count, free of blacklisted assets, passing through the anchor.
    ///
    /// Deterministic for a fixed graph snapshot.
    pub fn candidate_cycles(&self) -> Vec<TradeChain> {
        let adj = self.lock();
        let now = current_time_ms();
        let mut cycles = match self.config.strategy {
            DetectionStrategy::SimpleCycles => simple_cycles(&adj, &self.config, now),
            DetectionStrategy::BellmanFord => negative_cycles(&adj, &self.config, now),
        };
        cycles.retain(|c| c.contains(&self.config.anchor));
        cycles
    }

    /// The most profitable candidate cycle, if any has nonzero
    /// profitability. Ties resolve to fewer hops, then the lexicographically
    /// smallest path signature.
    pub fn best(&self) -> Option<TradeChain> {
        pick_best(self.candidate_cycles())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Adjacency> {
        // A poisoned graph lock means a detection pass panicked; the rates
        // themselves are still sound, so keep serving them.
        self.adjacency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn pick_best(candidates: Vec<TradeChain>) -> Option<TradeChain> {
    let mut best: Option<TradeChain> = None;
    for candidate in candidates {
        if candidate.profitability() <= Decimal::ZERO {
            continue;
        }
        best = match best {
            None => Some(candidate),
            Some(current) => {
                if candidate.profitability() > current.profitability()
                    || (candidate.profitability() == current.profitability()
                        && (candidate.hops() < current.hops()
                            || (candidate.hops() == current.hops()
                                && candidate.signature() < current.signature())))
                {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best
}

fn sorted_edges<'a>(adj: &'a Adjacency, from: &Asset) -> Vec<&'a Market> {
    let mut edges: Vec<&Market> = adj.get(from).map(|v| v.iter().collect()).unwrap_or_default();
    edges.sort_by(|a, b| (&a.to, a.venue.as_str()).cmp(&(&b.to, b.venue.as_str())));
    edges
}

/// Enumerate simple cycles of `min_hops..=max_hops` edges.
///
/// Each cycle is produced exactly once, rooted at its smallest vertex: the
/// DFS only descends into vertices ordered after the root.
fn simple_cycles(adj: &Adjacency, config: &GraphConfig, now_ms: u64) -> Vec<TradeChain> {
    let mut out = Vec::new();
    for root in adj.keys() {
        if config.blacklisted(root) {
            continue;
        }
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();
        cycle_dfs(adj, config, now_ms, root, root, &mut visited, &mut path, &mut out);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn cycle_dfs(
    adj: &Adjacency,
    config: &GraphConfig,
    now_ms: u64,
    root: &Asset,
    current: &Asset,
    visited: &mut BTreeSet<Asset>,
    path: &mut Vec<Market>,
    out: &mut Vec<TradeChain>,
) {
    for edge in sorted_edges(adj, current) {
        if edge.to == *root {
            if path.len() + 1 >= config.min_hops {
                let mut cycle = path.clone();
                cycle.push(edge.clone());
                out.push(TradeChain::from_snapshot(cycle, now_ms, config.freshness_ms));
            }
            continue;
        }
        if path.len() + 1 >= config.max_hops {
            // no room left to close the cycle
            continue;
        }
        if edge.to < *root || config.blacklisted(&edge.to) || visited.contains(&edge.to) {
            continue;
        }
        visited.insert(edge.to.clone());
        path.push(edge.clone());
        cycle_dfs(adj, config, now_ms, root, &edge.to, visited, path, out);
        path.pop();
        visited.remove(&edge.to);
    }
}

/// Negative-cycle detection via single-source shortest-path relaxation,
/// run from each vertex in turn.
fn negative_cycles(adj: &Adjacency, config: &GraphConfig, now_ms: u64) -> Vec<TradeChain> {
    let vertices: Vec<&Asset> = adj.keys().filter(|v| !config.blacklisted(v)).collect();
    let index: BTreeMap<&Asset, usize> = vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();

    // One edge per (from, to): the minimum search weight, i.e. the best rate
    // across venues.
    let mut edges: Vec<(usize, usize, f64, &Market)> = Vec::new();
    for from in vertices.iter().copied() {
        let mut best_per_target: BTreeMap<&Asset, &Market> = BTreeMap::new();
        for edge in sorted_edges(adj, from) {
            if config.blacklisted(&edge.to) || edge.to == *from {
                continue;
            }
            match best_per_target.get(&edge.to) {
                Some(current) if current.weight() <= edge.weight() => {}
                _ => {
                    best_per_target.insert(&edge.to, edge);
                }
            }
        }
        for (to, edge) in best_per_target {
            if let (Some(&u), Some(&v)) = (index.get(from), index.get(to)) {
                edges.push((u, v, edge.weight(), edge));
            }
        }
    }

    let mut out = Vec::new();
    let mut seen_signatures = BTreeSet::new();
    for source in 0..vertices.len() {
        if let Some(chain) = relax_from(source, &vertices, &edges, config, now_ms) {
            // canonical rotation for dedup across sources
            let canonical = chain
                .edges()
                .iter()
                .map(|m| &m.from)
                .min()
                .cloned()
                .and_then(|min| chain.rotate_to(&min))
                .unwrap_or(chain);
            if seen_signatures.insert(canonical.signature()) {
                out.push(canonical);
            }
        }
    }
    out
}

fn relax_from(
    source: usize,
    vertices: &[&Asset],
    edges: &[(usize, usize, f64, &Market)],
    config: &GraphConfig,
    now_ms: u64,
) -> Option<TradeChain> {
    let n = vertices.len();
    if n == 0 {
        return None;
    }
    let mut dist = vec![f64::INFINITY; n];
    let mut pred: Vec<Option<usize>> = vec![None; n];
    dist[source] = 0.0;

    for _ in 1..n {
        for &(u, v, w, _) in edges {
            if dist[u].is_finite() && dist[u] + w < dist[v] {
                dist[v] = dist[u] + w;
                pred[v] = Some(u);
            }
        }
    }

    // An edge still relaxable on round V sits on (or reaches) a negative
    // cycle; walking predecessors V times lands inside it.
    let (entry, start) = edges
        .iter()
        .find(|&&(u, v, w, _)| dist[u].is_finite() && dist[u] + w < dist[v])
        .map(|&(u, v, _, _)| (u, v))?;
    pred[start] = Some(entry);
    let mut inside = start;
    for _ in 0..n {
        inside = pred[inside]?;
    }

    // Collect the cycle by walking predecessors until the entry repeats.
    let mut order = vec![inside];
    let mut cursor = pred[inside]?;
    while cursor != inside {
        order.push(cursor);
        cursor = pred[cursor]?;
    }
    order.reverse(); // predecessor walk runs against trade direction

    if order.len() < config.min_hops || order.len() > config.max_hops {
        return None;
    }

    let mut cycle = Vec::with_capacity(order.len());
    for i in 0..order.len() {
        let u = order[i];
        let v = order[(i + 1) % order.len()];
        let market = edges
            .iter()
            .find(|&&(eu, ev, _, _)| eu == u && ev == v)
            .map(|&(_, _, _, m)| m.clone())?;
        cycle.push(market);
    }
    Some(TradeChain::from_snapshot(cycle, now_ms, config.freshness_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use triarb_core::Venue;

    fn quote(from: &str, to: &str, rate: &str) -> Market {
        quote_fee(from, to, rate, "0")
    }

    fn quote_fee(from: &str, to: &str, rate: &str, fee: &str) -> Market {
        Market::new(
            Asset::new(from),
            Asset::new(to),
            Venue::Simulated,
            rate.parse().unwrap(),
            rate.parse().unwrap(),
            fee.parse().unwrap(),
            current_time_ms(),
        )
    }

    fn triangle(graph: &RateGraph, btc_usd: &str) {
        graph.upsert(quote("USD", "EUR", "0.90"));
        graph.upsert(quote("EUR", "BTC", "0.000025"));
        graph.upsert(quote("BTC", "USD", btc_usd));
    }

    #[test]
    fn test_upsert_is_idempotent_per_triple() {
        let graph = RateGraph::new(GraphConfig::default());
        graph.upsert(quote("USD", "EUR", "0.90"));
        graph.upsert(quote("USD", "EUR", "0.91"));
        graph.upsert(quote("USD", "EUR", "0.92"));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.vertex_count(), 2);
        let cycles = graph.candidate_cycles();
        assert!(cycles.is_empty());

        // a different venue for the same pair is a distinct edge
        let mut other = quote("USD", "EUR", "0.89");
        other.venue = Venue::Bitfinex;
        graph.upsert(other);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn test_upsert_keeps_latest_values() {
        let graph = RateGraph::new(GraphConfig::default());
        graph.upsert(quote("USD", "EUR", "0.90"));
        graph.upsert(quote("USD", "EUR", "0.95"));
        graph.upsert(quote("EUR", "USD", "1.04"));
        graph.upsert(quote("EUR", "BTC", "0.000025"));
        graph.upsert(quote("BTC", "USD", "44000"));

        // the updated USD->EUR rate must flow into detected cycles
        let best = graph.best().expect("cycle expected");
        let expected: Decimal = "0.95".parse::<Decimal>().unwrap()
            * "0.000025".parse::<Decimal>().unwrap()
            * "44000".parse::<Decimal>().unwrap();
        assert_eq!(best.profitability(), expected);
    }

    #[test]
    fn test_upsert_rejects_non_positive_rate() {
        let graph = RateGraph::new(GraphConfig::default());
        graph.upsert(quote("USD", "EUR", "0"));
        graph.upsert(quote("USD", "EUR", "-1"));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn test_upsert_rejects_non_positive_price() {
        let graph = RateGraph::new(GraphConfig::default());
        let mut degraded = quote("USD", "EUR", "0.90");
        degraded.price = Decimal::ZERO;
        graph.upsert(degraded);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn test_triangle_profitability_is_exact() {
        let graph = RateGraph::new(GraphConfig::default());
        triangle(&graph, "44000");

        let best = graph.best().expect("triangle cycle expected");
        assert_eq!(best.hops(), 3);
        // 0.90 * 0.000025 * 44000 = 0.99
        assert_eq!(best.profitability(), "0.990000000".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_triangle_turns_profitable_on_rate_move() {
        let graph = RateGraph::new(GraphConfig::default());
        triangle(&graph, "44000");
        graph.upsert(quote("BTC", "USD", "45500"));

        let best = graph.best().expect("triangle cycle expected");
        // 0.90 * 0.000025 * 45500 = 1.02375
        assert_eq!(best.profitability(), "1.023750000".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_cycles_without_anchor_are_dropped() {
        let graph = RateGraph::new(GraphConfig::default());
        graph.upsert(quote("EUR", "BTC", "0.00003"));
        graph.upsert(quote("BTC", "CHF", "40000"));
        graph.upsert(quote("CHF", "EUR", "1.05"));

        assert!(graph.candidate_cycles().is_empty());
        assert!(graph.best().is_none());
    }

    #[test]
    fn test_blacklisted_asset_excludes_cycle() {
        let graph = RateGraph::new(GraphConfig::default());
        graph.upsert(quote("USD", "LEO", "0.5"));
        graph.upsert(quote("LEO", "BTC", "0.0001"));
        graph.upsert(quote("BTC", "USD", "50000"));

        assert!(graph.best().is_none());
    }

    #[test]
    fn test_hop_bounds_exclude_short_and_long_cycles() {
        let graph = RateGraph::new(GraphConfig::default());
        // 2-hop cycle: below min_hops
        graph.upsert(quote("USD", "EUR", "1.2"));
        graph.upsert(quote("EUR", "USD", "1.2"));
        assert!(graph.best().is_none());

        // 5-hop cycle: above max_hops
        graph.upsert(quote("EUR", "BTC", "1.2"));
        graph.upsert(quote("BTC", "ETH", "1.2"));
        graph.upsert(quote("ETH", "XMR", "1.2"));
        graph.upsert(quote("XMR", "USD", "1.2"));
        assert!(graph.best().is_none());
    }

    #[test]
    fn test_stale_edges_zero_out_detection() {
        let graph = RateGraph::new(GraphConfig::default());
        triangle(&graph, "45500");
        let mut stale = quote("EUR", "BTC", "0.000025");
        stale.last_update_ms = current_time_ms() - DEFAULT_FRESHNESS_MS - 1_000;
        graph.upsert(stale);

        // candidate still enumerated, but zero profitability filters it out
        assert_eq!(graph.candidate_cycles().len(), 1);
        assert!(graph.best().is_none());
    }

    #[test]
    fn test_tie_break_prefers_fewer_hops_then_signature() {
        let config = GraphConfig {
            min_hops: 2,
            ..GraphConfig::default()
        };
        let graph = RateGraph::new(config);
        // 3-hop and 2-hop cycles with identical profitability 1.2
        graph.upsert(quote("USD", "EUR", "1.2"));
        graph.upsert(quote("EUR", "CHF", "1"));
        graph.upsert(quote("CHF", "USD", "1"));
        graph.upsert(quote("USD", "ETH", "1.2"));
        graph.upsert(quote("ETH", "USD", "1"));

        let best = graph.best().expect("cycle expected");
        assert_eq!(best.hops(), 2);

        // two 2-hop cycles tied on profitability and hops: smaller signature
        graph.upsert(quote("USD", "BTC", "1.2"));
        graph.upsert(quote("BTC", "USD", "1"));
        let best = graph.best().expect("cycle expected");
        assert_eq!(best.signature(), "[BTC,USD][USD,BTC]");
    }

    #[test]
    fn test_bellman_ford_finds_profitable_triangle() {
        let config = GraphConfig {
            strategy: DetectionStrategy::BellmanFord,
            ..GraphConfig::default()
        };
        let graph = RateGraph::new(config);
        triangle(&graph, "45500");

        let best = graph.best().expect("negative cycle expected");
        assert_eq!(best.hops(), 3);
        assert_eq!(best.profitability(), "1.023750000".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_bellman_ford_ignores_unprofitable_graph() {
        let config = GraphConfig {
            strategy: DetectionStrategy::BellmanFord,
            ..GraphConfig::default()
        };
        let graph = RateGraph::new(config);
        triangle(&graph, "44000"); // compounds to 0.99, no negative cycle

        assert!(graph.best().is_none());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let build = || {
            let graph = RateGraph::new(GraphConfig::default());
            triangle(&graph, "45500");
            graph.upsert(quote("USD", "ETH", "0.0003"));
            graph.upsert(quote("ETH", "BTC", "0.05"));
            graph
        };
        let a = build().best().expect("cycle expected");
        let b = build().best().expect("cycle expected");
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.profitability(), b.profitability());
    }
}
