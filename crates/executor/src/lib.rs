//! Trade execution: the venue port, the market-order cascade, and the
//! decision engine that gates it.

pub mod error;
pub mod executor;
pub mod manager;
pub mod venue;

pub use error::*;
pub use executor::*;
pub use manager::*;
pub use venue::*;
