//! Trading venue identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a trading venue an edge was quoted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    Bitfinex,
    /// Deterministic in-process simulator used for dry runs and tests.
    Simulated,
}

impl Venue {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Venue::Bitfinex => "Bitfinex",
            Venue::Simulated => "Simulated",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_as_str() {
        assert_eq!(Venue::Bitfinex.as_str(), "Bitfinex");
        assert_eq!(Venue::Simulated.as_str(), "Simulated");
    }
}
