//! Tardis Machine Message Types
//!
//! Wire format types for the normalized WebSocket endpoints of a
//! tardis-machine server.
//!
//! # Message Types
//!
//! - `book_snapshot`: Order book snapshot sampled on a fixed interval. The
//!   `quote_*` data types are one-level book snapshots.
//! - `disconnect`: Sentinel sent when the exchange connection dropped (only
//!   when `withDisconnectMessages` is set).
//!
//! Other normalized types (`trade`, `book_change`, `derivative_ticker`, ...)
//! are not decoded.
//!
//! # References
//!
//! - [tardis-machine](https://docs.tardis.dev/api/tardis-machine)

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::event::{BookLevels, MarketEvent, PriceLevel};

// =============================================================================
// Inbound Messages
// =============================================================================

/// Message type discriminator (`type` field).
pub mod message_type {
    /// Book snapshot.
    pub const BOOK_SNAPSHOT: &str = "book_snapshot";
    /// Upstream disconnect.
    pub const DISCONNECT: &str = "disconnect";
}

/// One price level of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelMessage {
    /// Price.
    pub price: f64,
    /// Amount at this price.
    pub amount: f64,
}

/// Book snapshot message.
///
/// # Wire Format (JSON)
/// ```json
/// {"type":"book_snapshot","symbol":"BTC-PERPETUAL","exchange":"deribit",
///  "name":"quote_5s","depth":1,"interval":5000,
///  "bids":[{"price":39760,"amount":7630}],
///  "asks":[{"price":39760.5,"amount":49050}],
///  "timestamp":"2022-04-28T22:17:45.000Z",
///  "localTimestamp":"2022-04-28T22:17:45.105Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshotMessage {
    /// Message type (always `book_snapshot`)
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Instrument symbol
    pub symbol: String,

    /// Exchange identifier
    pub exchange: String,

    /// Series name, e.g. `quote_1m` or `book_snapshot_5_1s`
    pub name: String,

    /// Book depth of the series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,

    /// Sampling interval in milliseconds
    pub interval: u64,

    /// Bid levels, best first
    #[serde(default)]
    pub bids: Vec<LevelMessage>,

    /// Ask levels, best first
    #[serde(default)]
    pub asks: Vec<LevelMessage>,

    /// Exchange timestamp
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Receipt timestamp
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub local_timestamp: DateTime<Utc>,
}

impl BookSnapshotMessage {
    /// Convert into a market event.
    ///
    /// Returns the event and the number of levels dropped beyond the
    /// supported book depth.
    #[must_use]
    pub fn into_event(self) -> (MarketEvent, usize) {
        let (bids, dropped_bids) = BookLevels::from_levels(self.bids.into_iter().map(Into::into));
        let (asks, dropped_asks) = BookLevels::from_levels(self.asks.into_iter().map(Into::into));

        let event = MarketEvent {
            data_type: self.msg_type,
            symbol: self.symbol,
            exchange: self.exchange,
            name: self.name,
            interval_ms: self.interval,
            depth: self.depth,
            timestamp: self.timestamp,
            local_timestamp: self.local_timestamp,
            bids,
            asks,
        };
        (event, dropped_bids + dropped_asks)
    }
}

impl From<LevelMessage> for PriceLevel {
    fn from(level: LevelMessage) -> Self {
        Self::new(level.price, level.amount)
    }
}

/// Disconnect sentinel.
///
/// # Wire Format (JSON)
/// ```json
/// {"type":"disconnect","exchange":"deribit","localTimestamp":"2022-04-28T22:17:45.105Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectMessage {
    /// Message type (always `disconnect`)
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Exchange whose connection dropped
    pub exchange: String,

    /// Receipt timestamp
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub local_timestamp: DateTime<Utc>,
}

// =============================================================================
// Subscription Options
// =============================================================================

/// Options for `/ws-stream-normalized`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    /// Exchange identifier
    pub exchange: String,
    /// Symbols to stream
    pub symbols: Vec<String>,
    /// Normalized data types
    pub data_types: Vec<String>,
    /// Emit disconnect sentinels
    pub with_disconnect_messages: bool,
}

/// Options for `/ws-replay-normalized`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOptions {
    /// Exchange identifier
    pub exchange: String,
    /// Symbols to replay
    pub symbols: Vec<String>,
    /// Normalized data types
    pub data_types: Vec<String>,
    /// Replay start (`YYYY-MM-DD`, whole days only)
    pub from: String,
    /// Replay end (precise timestamp)
    pub to: String,
    /// Emit disconnect sentinels
    pub with_disconnect_messages: bool,
}

// =============================================================================
// Timestamps
// =============================================================================

/// Parse a wire timestamp.
///
/// Accepts RFC 3339 (`2022-04-28T22:17:45.000Z`) and the same form without
/// an offset, which is taken as UTC.
///
/// # Errors
///
/// Returns the chrono parse error if neither form matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
        })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

// =============================================================================
// Tests
// =============================================================================
