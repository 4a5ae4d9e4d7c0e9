//! Execution errors.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while executing a trade chain.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The venue is already running another chain.
    #[error("venue busy with another execution")]
    VenueBusy,

    /// The venue refused the order outright.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// No terminal order status arrived within the wait bound.
    #[error("order fill wait exceeded {0:?}")]
    Timeout(Duration),

    /// An order reached a terminal failure status mid-chain.
    #[error("order {hop}/{total} failed ({reason}), {executed} orders executed")]
    OrderFailed {
        hop: usize,
        total: usize,
        reason: String,
        executed: usize,
    },

    /// Venue transport or protocol failure.
    #[error("venue error: {0}")]
    Venue(String),
}

impl ExecutionError {
    /// Transient conditions that warrant skipping the opportunity rather
    /// than counting it as a failed execution.
    pub fn is_skippable(&self) -> bool {
        matches!(self, ExecutionError::VenueBusy)
    }
}

/// Convenience alias for execution results.
pub type ExecutionResult<T> = Result<T, ExecutionError>;
