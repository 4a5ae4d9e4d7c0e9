//! Asset symbols.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency or token symbol (e.g. "USD", "BTC").
///
/// Assets are the vertex identity of the rate graph. They have no lifecycle
/// of their own; an asset exists implicitly once an edge references it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(CompactString);

impl Asset {
    /// Create an asset from its symbol.
    pub fn new(symbol: &str) -> Self {
        Self(CompactString::new(symbol))
    }

    /// Symbol as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The default anchor currency.
    pub fn usd() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Asset {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}
