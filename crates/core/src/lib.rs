//! Core data types for the triangular arbitrage daemon.

pub mod asset;
pub mod chain;
pub mod market;
pub mod report;
pub mod venue;

pub use asset::*;
pub use chain::*;
pub use market::*;
pub use report::*;
pub use venue::*;
