//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the reconciliation services and the port interfaces
//! that define how they reach feeds, storage and time.

/// Port interfaces for feeds, the record store and the clock.
pub mod ports;

/// Recording, historical fetch and reconciliation services.
pub mod services;
