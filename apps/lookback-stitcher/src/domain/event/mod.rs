//! Market Events
//!
//! The normalized observation shared by the historical and live paths.
//!
//! # Identity
//!
//! An event is identified by `(data_type, symbol, exchange, name, timestamp)`.
//! The record store keys rows on this tuple and the merge step deduplicates
//! on it.
//!
//! # Flattened form
//!
//! Book levels are exposed as scalar attributes named
//! `{side}_{index}_{field}` (see [`book::flat_slots`]). Serialization emits
//! the flattened form and omits absent values.

pub mod book;

use chrono::{DateTime, Timelike, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

pub use book::{BookLevels, BookSide, FlatSlot, LevelField, MAX_BOOK_LEVELS, PriceLevel, flat_slots};

/// Composite identity of a market event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    /// Data type discriminator (e.g. `book_snapshot`).
    pub data_type: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Exchange identifier.
    pub exchange: String,
    /// Series name (e.g. `quote_1m`).
    pub name: String,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

/// A single normalized market observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    /// Data type discriminator, renamed from the wire `type` field.
    pub data_type: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Exchange identifier.
    pub exchange: String,
    /// Series name (e.g. `quote_1m`, `book_snapshot_5_1s`).
    pub name: String,
    /// Nominal sampling period in milliseconds.
    pub interval_ms: u64,
    /// Requested book depth, when the series carries one.
    pub depth: Option<u32>,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
    /// Receipt timestamp.
    pub local_timestamp: DateTime<Utc>,
    /// Bid levels.
    pub bids: BookLevels,
    /// Ask levels.
    pub asks: BookLevels,
}

impl MarketEvent {
    /// Identity of this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            data_type: self.data_type.clone(),
            symbol: self.symbol.clone(),
            exchange: self.exchange.clone(),
            name: self.name.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Levels for one book side.
    #[must_use]
    pub const fn levels(&self, side: BookSide) -> &BookLevels {
        match side {
            BookSide::Bids => &self.bids,
            BookSide::Asks => &self.asks,
        }
    }

    /// Mutable levels for one book side.
    pub const fn levels_mut(&mut self, side: BookSide) -> &mut BookLevels {
        match side {
            BookSide::Bids => &mut self.bids,
            BookSide::Asks => &mut self.asks,
        }
    }

    /// Value stored in a flattened slot.
    #[must_use]
    pub fn slot_value(&self, slot: FlatSlot) -> Option<f64> {
        self.levels(slot.side)
            .get(slot.index)
            .map(|level| slot.field.read(level))
    }

    /// Flattened level attributes in canonical slot order.
    ///
    /// Absent levels yield `None` so the result always has the same length.
    #[must_use]
    pub fn flattened_levels(&self) -> Vec<(FlatSlot, Option<f64>)> {
        flat_slots()
            .map(|slot| (slot, self.slot_value(slot)))
            .collect()
    }

    /// Whether the timestamp sits on the nominal sampling grid.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        is_aligned(self.timestamp, self.interval_ms)
    }
}

/// Alignment filter for live samples.
///
/// The sampling phase is the offset of `timestamp` inside its minute
/// (seconds and sub-second part, at microsecond resolution). A sample is
/// aligned when that phase is an exact multiple of `interval_ms`. A zero
/// interval never aligns.
#[must_use]
pub fn is_aligned(timestamp: DateTime<Utc>, interval_ms: u64) -> bool {
    if interval_ms == 0 {
        return false;
    }
    let phase_us = u64::from(timestamp.second()) * 1_000_000
        + u64::from(timestamp.timestamp_subsec_micros());
    phase_us % interval_ms.saturating_mul(1_000) == 0
}

impl Serialize for MarketEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("dtype", &self.data_type)?;
        map.serialize_entry("symbol", &self.symbol)?;
        map.serialize_entry("exchange", &self.exchange)?;
        map.serialize_entry("name", &self.name)?;
        if let Some(depth) = self.depth {
            map.serialize_entry("depth", &depth)?;
        }
        map.serialize_entry("interval", &self.interval_ms)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("localTimestamp", &self.local_timestamp)?;
        for (slot, value) in self.flattened_levels() {
            if let Some(value) = value {
                map.serialize_entry(&slot.key(), &value)?;
            }
        }
        map.end()
    }
}
