//! Spot Streaming Types
//!
//! Codec-agnostic values produced by the session: the account and
//! symbol resolved during the handshake and the spot ticks that follow.
//! Prices stay in the vendor's raw integer form; scaling by instrument
//! digits is left to whoever presents them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading account picked from the accounts-by-token response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAccount {
    /// `ctidTraderAccountId` of the account.
    pub id: i64,
    /// Whether the broker flags the account as live.
    pub is_live: Option<bool>,
}

/// Target symbol matched against the symbols list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSymbol {
    /// Numeric symbol id used on the wire.
    pub id: i64,
    /// Name the symbol was matched under.
    pub name: String,
}

/// One live bid/ask tick.
///
/// Either side may be absent on a given tick; a tick with neither is
/// still valid and just carries no new price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotEvent {
    /// Symbol the tick belongs to.
    pub symbol_id: i64,
    /// Raw bid, unscaled.
    pub bid: Option<i64>,
    /// Raw ask, unscaled.
    pub ask: Option<i64>,
    /// Server timestamp in Unix milliseconds.
    pub timestamp_millis: Option<i64>,
}

impl SpotEvent {
    /// Check if the tick carries at least one price.
    #[must_use]
    pub const fn has_price(&self) -> bool {
        self.bid.is_some() || self.ask.is_some()
    }

    /// Timestamp as a UTC datetime.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_millis
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_without_prices_is_valid() {
        let event = SpotEvent {
            symbol_id: 1,
            bid: None,
            ask: None,
            timestamp_millis: None,
        };
        assert!(!event.has_price());
        assert!(event.timestamp().is_none());
    }

    #[test]
    fn spot_timestamp_conversion() {
        let event = SpotEvent {
            symbol_id: 1,
            bid: Some(115_920),
            ask: None,
            timestamp_millis: Some(1_762_887_809_806),
        };
        assert!(event.has_price());
        let ts = event.timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_762_887_809_806);
    }
}
