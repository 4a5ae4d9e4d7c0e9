//! Rate graph maintenance and debounced arbitrage detection.

pub mod graph;
pub mod pipeline;

pub use graph::*;
pub use pipeline::*;
