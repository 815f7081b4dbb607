//! Feed Ports
//!
//! Live and replay subscriptions over a market data channel. Both produce
//! the same message shape; the live stream runs until the consumer drops
//! it, the replay stream ends when its range is exhausted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::domain::event::MarketEvent;
use crate::domain::lookback::{LookbackRequest, ReplayWindow};

/// Subscription parameters shared by live and replay feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSubscription {
    /// Exchange identifier.
    pub exchange: String,
    /// Symbols to subscribe to.
    pub symbols: Vec<String>,
    /// Data types (e.g. `quote_1m`).
    pub data_types: Vec<String>,
    /// Ask the feed to emit disconnect sentinels.
    pub with_disconnect_messages: bool,
}

impl FeedSubscription {
    /// Build the subscription for a lookback request.
    #[must_use]
    pub fn for_request(request: &LookbackRequest, with_disconnect_messages: bool) -> Self {
        Self {
            exchange: request.exchange().to_string(),
            symbols: request.symbols().to_vec(),
            data_types: request.data_types().to_vec(),
            with_disconnect_messages,
        }
    }
}

/// Sentinel emitted when the upstream exchange connection dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectNotice {
    /// Exchange whose connection dropped.
    pub exchange: String,
    /// Receipt timestamp of the notice.
    pub local_timestamp: DateTime<Utc>,
}

/// A decoded feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A market event.
    Event(MarketEvent),
    /// Upstream disconnect sentinel.
    Disconnect(DisconnectNotice),
}

/// Feed failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The subscription could not be established.
    #[error("feed connection failed: {0}")]
    ConnectionFailed(String),

    /// The subscription request was malformed.
    #[error("invalid feed request: {0}")]
    InvalidRequest(String),

    /// The connection was lost and could not be restored.
    #[error("feed connection lost: {0}")]
    ConnectionLost(String),
}

/// Stream of decoded feed messages.
pub type FeedStream = BoxStream<'static, Result<FeedMessage, FeedError>>;

/// Live market data subscription.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Open a live subscription.
    ///
    /// The returned stream runs until it is dropped. Reconnection after the
    /// initial connection is the feed's responsibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe_live(&self, subscription: &FeedSubscription) -> Result<FeedStream, FeedError>;
}

/// Historical replay subscription.
#[async_trait]
pub trait ReplayFeed: Send + Sync {
    /// Open a replay of `window`.
    ///
    /// The returned stream ends once the replay range is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe_replay(
        &self,
        subscription: &FeedSubscription,
        window: &ReplayWindow,
    ) -> Result<FeedStream, FeedError>;
}
