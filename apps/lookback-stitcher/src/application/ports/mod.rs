//! Port Interfaces
//!
//! Contracts the reconciliation core depends on. Infrastructure adapters
//! implement them; tests substitute in-process fakes.
//!
//! - `LiveFeed` / `ReplayFeed`: market data subscriptions
//! - `RecordStore`: durable buffer for live events
//! - `Clock`: source of "now"

mod clock;
mod feed;
mod store;

pub use clock::{AnchoredClock, Clock, SystemClock};
pub use feed::{
    DisconnectNotice, FeedError, FeedMessage, FeedStream, FeedSubscription, LiveFeed, ReplayFeed,
};
pub use store::{RecordStore, StoreError};
