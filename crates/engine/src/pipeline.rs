//! Tick-driven detection pipeline.
//!
//! Raw tick events enter a bounded mailbox and are coalesced into a single
//! trailing-edge detection trigger per burst. Under overload the mailbox
//! drops events instead of queueing them: only the latest market state
//! matters, never a history of triggers. Graph updates are never dropped,
//! only detection invocations.

use crate::RateGraph;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};
use triarb_core::TradeChain;

/// Configuration for the detection pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Debounce window: a burst fires this long after its last tick.
    pub debounce: Duration,
    /// Upper bound on burst accumulation, so a steady tick stream still
    /// triggers detection.
    pub max_accumulate: Duration,
    /// Tick mailbox capacity; ticks beyond it are dropped.
    pub mailbox_capacity: usize,
    /// Best-chain fan-out capacity; lagging subscribers lose oldest chains.
    pub fanout_capacity: usize,
    /// How often to log tick/detection rates.
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            max_accumulate: Duration::from_millis(500),
            mailbox_capacity: 64,
            fanout_capacity: 16,
            stats_interval: Duration::from_secs(10),
        }
    }
}

/// Counters for the pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Ticks offered to the mailbox.
    pub received: AtomicU64,
    /// Ticks dropped on mailbox overflow.
    pub dropped: AtomicU64,
    /// Detection passes run.
    pub detections: AtomicU64,
    /// Best chains emitted to subscribers.
    pub emitted: AtomicU64,
}

/// Producer handle feed tasks use to signal "an instrument ticked".
#[derive(Debug, Clone)]
pub struct TickSink {
    tx: mpsc::Sender<String>,
    stats: Arc<PipelineStats>,
}

impl TickSink {
    /// Offer a tick event; drops it when the pipeline is overloaded.
    pub fn notify(&self, symbol: &str) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        if self.tx.try_send(symbol.to_string()).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Debounced detection pipeline over a shared rate graph.
///
/// State machine per burst: Idle -> Accumulating -> Detecting -> Idle.
pub struct DetectionPipeline {
    graph: Arc<RateGraph>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
}

impl DetectionPipeline {
    pub fn new(graph: Arc<RateGraph>, config: PipelineConfig) -> Self {
        Self {
            graph,
            config,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Spawn the pipeline task. Returns the tick sink for producers and the
    /// broadcast sender for best-chain subscribers.
    ///
    /// The task runs until every [`TickSink`] clone is dropped.
    pub fn start(self) -> (TickSink, broadcast::Sender<TradeChain>) {
        let (tick_tx, tick_rx) = mpsc::channel(self.config.mailbox_capacity);
        let (chain_tx, _) = broadcast::channel(self.config.fanout_capacity);
        let sink = TickSink {
            tx: tick_tx,
            stats: self.stats.clone(),
        };
        tokio::spawn(run_loop(
            self.graph,
            self.config,
            tick_rx,
            chain_tx.clone(),
            self.stats,
        ));
        (sink, chain_tx)
    }
}

async fn run_loop(
    graph: Arc<RateGraph>,
    config: PipelineConfig,
    mut ticks: mpsc::Receiver<String>,
    out: broadcast::Sender<TradeChain>,
    stats: Arc<PipelineStats>,
) {
    let mut last_stats = Instant::now();
    while let Some(first) = ticks.recv().await {
        // Accumulating: extend the window per tick, bounded by the hard
        // deadline so a steady burst still fires.
        let started = Instant::now();
        let hard_deadline = started + config.max_accumulate;
        let mut deadline = started + config.debounce;
        let mut burst: u64 = 1;
        loop {
            let fire_at = deadline.min(hard_deadline);
            tokio::select! {
                _ = sleep_until(fire_at) => break,
                more = ticks.recv() => match more {
                    Some(_) => {
                        burst += 1;
                        deadline = Instant::now() + config.debounce;
                    }
                    None => break,
                },
            }
        }

        // Detecting: one full graph pass per coalesced burst. A pass that
        // finds nothing emits nothing.
        stats.detections.fetch_add(1, Ordering::Relaxed);
        debug!(burst, trigger = %first, "coalesced tick burst, running detection pass");
        if let Some(chain) = graph.best() {
            let profit = chain.profitability() - Decimal::ONE;
            warn!(
                profit = %profit,
                path = %chain.illustrate(),
                "arbitrage detected"
            );
            stats.emitted.fetch_add(1, Ordering::Relaxed);
            if out.send(chain).is_err() {
                debug!("no best-trade subscribers, chain dropped");
            }
        }

        if last_stats.elapsed() >= config.stats_interval {
            info!(
                received = stats.received.load(Ordering::Relaxed),
                dropped = stats.dropped.load(Ordering::Relaxed),
                detections = stats.detections.load(Ordering::Relaxed),
                emitted = stats.emitted.load(Ordering::Relaxed),
                "tick pipeline rates"
            );
            last_stats = Instant::now();
        }
    }
    info!("tick stream closed, detection pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphConfig;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::TryRecvError;
    use triarb_core::{current_time_ms, Asset, Market, Venue};

    fn profitable_graph() -> Arc<RateGraph> {
        let graph = RateGraph::new(GraphConfig::default());
        for (from, to, rate) in [
            ("USD", "EUR", "0.90"),
            ("EUR", "BTC", "0.000025"),
            ("BTC", "USD", "45500"),
        ] {
            graph.upsert(Market::new(
                Asset::new(from),
                Asset::new(to),
                Venue::Simulated,
                rate.parse().unwrap(),
                rate.parse().unwrap(),
                "0".parse().unwrap(),
                current_time_ms(),
            ));
        }
        Arc::new(graph)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_single_detection() {
        let pipeline = DetectionPipeline::new(profitable_graph(), PipelineConfig::default());
        let stats = pipeline.stats();
        let (sink, chains) = pipeline.start();
        let mut rx = chains.subscribe();

        for _ in 0..5 {
            sink.notify("BTC:USD");
        }

        let chain = rx.recv().await.expect("one best chain expected");
        assert_eq!(chain.hops(), 3);

        // the burst must not produce further detections
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(stats.detections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.emitted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_tick_stream_still_fires_on_hard_deadline() {
        let pipeline = DetectionPipeline::new(profitable_graph(), PipelineConfig::default());
        let (sink, chains) = pipeline.start();
        let mut rx = chains.subscribe();

        // ticks every 50ms keep resetting the 100ms debounce window
        let feeder = tokio::spawn(async move {
            loop {
                sink.notify("BTC:USD");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let chain = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("hard deadline must fire despite steady ticks")
            .expect("chain expected");
        assert_eq!(chain.hops(), 3);
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflowing_mailbox_drops_ticks() {
        let config = PipelineConfig {
            mailbox_capacity: 2,
            ..PipelineConfig::default()
        };
        let pipeline = DetectionPipeline::new(profitable_graph(), config);
        let stats = pipeline.stats();
        let (sink, _chains) = pipeline.start();

        // no await between notifies: the consumer cannot drain in between
        for _ in 0..10 {
            sink.notify("BTC:USD");
        }
        assert_eq!(stats.received.load(Ordering::Relaxed), 10);
        assert_eq!(stats.dropped.load(Ordering::Relaxed), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cycle_emits_nothing() {
        // anchorless graph: EUR -> BTC -> CHF -> EUR
        let graph = RateGraph::new(GraphConfig::default());
        for (from, to, rate) in [
            ("EUR", "BTC", "0.00003"),
            ("BTC", "CHF", "40000"),
            ("CHF", "EUR", "1.05"),
        ] {
            graph.upsert(Market::new(
                Asset::new(from),
                Asset::new(to),
                Venue::Simulated,
                rate.parse().unwrap(),
                rate.parse().unwrap(),
                "0".parse().unwrap(),
                current_time_ms(),
            ));
        }
        let pipeline = DetectionPipeline::new(Arc::new(graph), PipelineConfig::default());
        let stats = pipeline.stats();
        let (sink, chains) = pipeline.start();
        let mut rx = chains.subscribe();

        sink.notify("BTC:EUR");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(stats.detections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.emitted.load(Ordering::Relaxed), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fanout_reaches_every_subscriber() {
        let pipeline = DetectionPipeline::new(profitable_graph(), PipelineConfig::default());
        let (sink, chains) = pipeline.start();
        let mut a = chains.subscribe();
        let mut b = chains.subscribe();

        sink.notify("BTC:USD");

        let chain_a = a.recv().await.expect("subscriber a");
        let chain_b = b.recv().await.expect("subscriber b");
        assert_eq!(chain_a.signature(), chain_b.signature());
    }
}
