//! Tardis Machine Adapters
//!
//! Implements the feed ports against a tardis-machine server:
//!
//! - **Live**: `ws-stream-normalized`, reconnecting with backoff
//! - **Replay**: `ws-replay-normalized`, ending when the replay completes

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;

pub use client::{TardisClientConfig, TardisMachineClient};
pub use codec::{CodecError, JsonCodec};
pub use messages::{
    BookSnapshotMessage, DisconnectMessage, LevelMessage, ReplayOptions, StreamOptions,
    parse_timestamp,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
