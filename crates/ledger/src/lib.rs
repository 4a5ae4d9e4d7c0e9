//! SQLite-backed append-only trade report ledger.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use triarb_core::{ReportStore, StoreError, TradeReport};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Durable report store backed by a single SQLite file.
///
/// Decimals are stored as TEXT to keep exact values; SQLite REAL would
/// round them through binary floats.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (or create) the ledger at the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // one connection: an in-memory database must not be split across
        // pool members, and the write load here is a handful of rows
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                usd_before TEXT NOT NULL,
                usd_after TEXT NOT NULL,
                usd_traded TEXT NOT NULL,
                expected_profitability TEXT NOT NULL,
                actual_profitability TEXT NOT NULL,
                path TEXT NOT NULL,
                executor TEXT NOT NULL,
                trades TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_reports_path
            ON trade_reports(path, id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

type ReportRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value)
        .map_err(|e| StoreError::Backend(format!("bad {field} value {value:?}: {e}")))
}

fn row_to_report(row: ReportRow) -> Result<TradeReport, StoreError> {
    let (
        timestamp,
        usd_before,
        usd_after,
        usd_traded,
        expected_profitability,
        actual_profitability,
        path,
        executor,
        trades,
    ) = row;
    Ok(TradeReport {
        timestamp,
        usd_before: parse_decimal("usd_before", &usd_before)?,
        usd_after: parse_decimal("usd_after", &usd_after)?,
        usd_traded: parse_decimal("usd_traded", &usd_traded)?,
        expected_profitability: parse_decimal("expected_profitability", &expected_profitability)?,
        actual_profitability: parse_decimal("actual_profitability", &actual_profitability)?,
        path,
        executor,
        trades,
    })
}

const REPORT_COLUMNS: &str = "timestamp, usd_before, usd_after, usd_traded, \
     expected_profitability, actual_profitability, path, executor, trades";

#[async_trait]
impl ReportStore for SqliteLedger {
    async fn append(&self, report: &TradeReport) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trade_reports (timestamp, usd_before, usd_after, usd_traded,
                expected_profitability, actual_profitability, path, executor, trades)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.timestamp)
        .bind(report.usd_before.to_string())
        .bind(report.usd_after.to_string())
        .bind(report.usd_traded.to_string())
        .bind(report.expected_profitability.to_string())
        .bind(report.actual_profitability.to_string())
        .bind(&report.path)
        .bind(&report.executor)
        .bind(&report.trades)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn recent_for_path(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<TradeReport>, StoreError> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM trade_reports WHERE path = ? ORDER BY id DESC LIMIT ?",
        ))
        .bind(path)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(row_to_report).collect()
    }

    async fn all(&self) -> Result<Vec<TradeReport>, StoreError> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM trade_reports ORDER BY id",
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(row_to_report).collect()
    }
}
