//! Trade reports and the report store port.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

/// Historical record of one executed trade chain.
///
/// Append-only: reports are never mutated after creation. The decision
/// engine reads them back to correct for systematic optimism in the
/// graph-implied profitability estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    /// Execution time, RFC 3339.
    pub timestamp: String,
    /// Anchor-asset balance before the chain ran.
    pub usd_before: Decimal,
    /// Anchor-asset balance after the chain settled.
    pub usd_after: Decimal,
    /// Notional committed to the first hop.
    pub usd_traded: Decimal,
    /// Graph-implied profitability at detection time.
    pub expected_profitability: Decimal,
    /// Realized profitability: `usd_after / usd_before`.
    pub actual_profitability: Decimal,
    /// Path signature of the executed chain.
    pub path: String,
    /// Executor that ran the chain.
    pub executor: String,
    /// Venue order ids, comma-joined.
    pub trades: String,
}

/// Error surfaced by a report store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report store error: {0}")]
    Backend(String),
}

/// Append-only ledger of past executions.
///
/// Read-back order within `recent_for_path` is most-recent-first; `all`
/// makes no ordering promise beyond returning every prior row.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Append one report to the ledger.
    async fn append(&self, report: &TradeReport) -> Result<(), StoreError>;

    /// Up to `limit` most recent reports sharing the given path signature.
    async fn recent_for_path(&self, path: &str, limit: usize)
        -> Result<Vec<TradeReport>, StoreError>;

    /// All prior reports.
    async fn all(&self) -> Result<Vec<TradeReport>, StoreError>;
}

/// In-memory report store for tests and ledger-less dry runs.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<TradeReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn append(&self, report: &TradeReport) -> Result<(), StoreError> {
        let mut reports = self
            .reports
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        reports.push(report.clone());
        Ok(())
    }

    async fn recent_for_path(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<TradeReport>, StoreError> {
        let reports = self
            .reports
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(reports
            .iter()
            .rev()
            .filter(|r| r.path == path)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<TradeReport>, StoreError> {
        let reports = self
            .reports
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(reports.clone())
    }
}
