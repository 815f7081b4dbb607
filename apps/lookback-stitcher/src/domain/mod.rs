//! Domain Layer - Market events and lookback window logic.
//!
//! Everything here is synchronous and free of I/O.

/// Normalized market events, book levels and the alignment filter.
pub mod event;

/// Lookback requests, replay planning, merging and trimming.
pub mod lookback;
