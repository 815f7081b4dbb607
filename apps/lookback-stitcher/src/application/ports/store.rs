//! Record Store Port
//!
//! Durable append-only buffer of live events keyed by event identity.

use chrono::{DateTime, Utc};

use crate::domain::event::MarketEvent;

/// Record store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing medium cannot be reached.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be turned back into an event.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Buffer of recorded live events.
///
/// Inserts are atomic per event and idempotent on identity. Reads see every
/// insert committed before the query started. Both calls may block, so async
/// callers run them through `tokio::task::spawn_blocking`.
pub trait RecordStore: Send + Sync {
    /// Insert an event unless its identity already exists.
    ///
    /// Returns `false` when the identity was already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn insert(&self, event: &MarketEvent) -> Result<bool, StoreError>;

    /// All events with `timestamp >= from`, ascending by timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn query_range(&self, from: DateTime<Utc>) -> Result<Vec<MarketEvent>, StoreError>;
}
