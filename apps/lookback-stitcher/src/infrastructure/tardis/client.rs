//! Tardis Machine WebSocket Client
//!
//! Implements the live and replay feed ports against a tardis-machine
//! server.
//!
//! # Endpoints
//!
//! - Live: `{base}/ws-stream-normalized?options={json}`
//! - Replay: `{base}/ws-replay-normalized?options={json}`
//!
//! The options object is form-encoded into the `options` query parameter.
//!
//! # Lifecycle
//!
//! The live stream is pumped by a spawned task into a bounded channel. When
//! the connection drops after a successful subscribe, the task reconnects
//! with backoff; it exits once the consumer drops the stream. The replay
//! stream is the socket itself and ends when the server closes it.

use std::future;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::codec::JsonCodec;
use super::messages::{ReplayOptions, StreamOptions};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    FeedError, FeedMessage, FeedStream, FeedSubscription, LiveFeed, ReplayFeed,
};
use crate::domain::lookback::ReplayWindow;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live stream endpoint path.
pub const STREAM_PATH: &str = "ws-stream-normalized";

/// Replay endpoint path.
pub const REPLAY_PATH: &str = "ws-replay-normalized";

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the tardis-machine client.
#[derive(Debug, Clone, PartialEq)]
pub struct TardisClientConfig {
    /// Server base URL, e.g. `ws://localhost:8001`.
    pub base_url: String,
    /// Live stream reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Buffered live messages before the pump waits on the consumer.
    pub channel_capacity: usize,
}

impl TardisClientConfig {
    /// Create a configuration for `base_url` with default reconnection.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect: ReconnectConfig::default(),
            channel_capacity: 1024,
        }
    }

    /// Replace the reconnection behavior.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// Client
// =============================================================================

/// Feed adapter for a tardis-machine server.
#[derive(Debug, Clone)]
pub struct TardisMachineClient {
    config: TardisClientConfig,
    codec: JsonCodec,
}

impl TardisMachineClient {
    /// Create a new client.
    #[must_use]
    pub const fn new(config: TardisClientConfig) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
        }
    }

    /// URL of the live stream for `subscription`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidRequest`] if the base URL is unusable.
    pub fn stream_url(&self, subscription: &FeedSubscription) -> Result<Url, FeedError> {
        let options = StreamOptions {
            exchange: subscription.exchange.clone(),
            symbols: subscription.symbols.clone(),
            data_types: subscription.data_types.clone(),
            with_disconnect_messages: subscription.with_disconnect_messages,
        };
        self.endpoint_url(STREAM_PATH, &options)
    }

    /// URL of the replay of `window` for `subscription`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidRequest`] if the base URL is unusable.
    pub fn replay_url(
        &self,
        subscription: &FeedSubscription,
        window: &ReplayWindow,
    ) -> Result<Url, FeedError> {
        let options = ReplayOptions {
            exchange: subscription.exchange.clone(),
            symbols: subscription.symbols.clone(),
            data_types: subscription.data_types.clone(),
            from: window.from_param(),
            to: window.to_param(),
            with_disconnect_messages: subscription.with_disconnect_messages,
        };
        self.endpoint_url(REPLAY_PATH, &options)
    }

    fn endpoint_url<T: serde::Serialize>(&self, path: &str, options: &T) -> Result<Url, FeedError> {
        let base = &self.config.base_url;
        let mut url = Url::parse(base)
            .map_err(|e| FeedError::InvalidRequest(format!("base URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| FeedError::InvalidRequest(format!("base URL {base} cannot carry a path")))?
            .pop_if_empty()
            .push(path);

        let options = self
            .codec
            .encode(options)
            .map_err(|e| FeedError::InvalidRequest(e.to_string()))?;
        url.query_pairs_mut().append_pair("options", &options);
        Ok(url)
    }
}

async fn connect(url: &Url) -> Result<WsStream, FeedError> {
    tracing::info!(url = %url, "Connecting to tardis-machine");
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
    Ok(ws)
}

/// Decode one frame. `None` means nothing to forward.
fn decode_frame(codec: &JsonCodec, text: &str) -> Option<FeedMessage> {
    codec.decode(text).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Dropping malformed frame");
        None
    })
}

// =============================================================================
// Live Stream
// =============================================================================

#[async_trait::async_trait]
impl LiveFeed for TardisMachineClient {
    async fn subscribe_live(&self, subscription: &FeedSubscription) -> Result<FeedStream, FeedError> {
        let url = self.stream_url(subscription)?;
        let ws = connect(&url).await?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let pump = LivePump {
            url,
            codec: self.codec.clone(),
            policy: ReconnectPolicy::new(self.config.reconnect.clone()),
            tx,
        };
        tokio::spawn(pump.run(ws));

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// How a live connection ended.
enum ConnectionEnd {
    /// The consumer dropped the stream.
    ConsumerGone,
    /// The server or network closed the socket.
    Dropped(String),
}

struct LivePump {
    url: Url,
    codec: JsonCodec,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<Result<FeedMessage, FeedError>>,
}

impl LivePump {
    async fn run(mut self, mut ws: WsStream) {
        loop {
            let reason = match self.forward(&mut ws).await {
                ConnectionEnd::ConsumerGone => {
                    tracing::debug!("Live stream consumer gone, closing connection");
                    let _ = ws.close(None).await;
                    return;
                }
                ConnectionEnd::Dropped(reason) => reason,
            };
            tracing::warn!(reason = %reason, "Live connection dropped");

            match self.reconnect().await {
                Some(next) => ws = next,
                None => return,
            }
        }
    }

    async fn forward(&self, ws: &mut WsStream) -> ConnectionEnd {
        loop {
            let frame = tokio::select! {
                () = self.tx.closed() => return ConnectionEnd::ConsumerGone,
                frame = ws.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(message) = decode_frame(&self.codec, text.as_str()) {
                        if self.tx.send(Ok(message)).await.is_err() {
                            return ConnectionEnd::ConsumerGone;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return ConnectionEnd::Dropped(
                        frame.map_or_else(|| "closed".to_string(), |f| f.reason.as_str().to_string()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return ConnectionEnd::Dropped(e.to_string()),
                None => return ConnectionEnd::Dropped("stream ended".to_string()),
            }
        }
    }

    /// Reconnect with backoff. `None` when the consumer is gone or attempts
    /// are exhausted.
    async fn reconnect(&mut self) -> Option<WsStream> {
        loop {
            let Some(delay) = self.policy.next_delay() else {
                let attempts = self.policy.attempt_count();
                tracing::error!(attempts, "Live reconnection attempts exhausted");
                let _ = self
                    .tx
                    .send(Err(FeedError::ConnectionLost(format!(
                        "gave up after {attempts} reconnection attempts"
                    ))))
                    .await;
                return None;
            };

            let attempt = self.policy.attempt_count();
            metrics::record_reconnect();
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to tardis-machine live stream"
            );

            tokio::select! {
                () = self.tx.closed() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            match connect(&self.url).await {
                Ok(ws) => {
                    tracing::info!(attempt, "Live stream reconnected");
                    self.policy.reset();
                    return Some(ws);
                }
                Err(e) => tracing::warn!(attempt, error = %e, "Reconnection failed"),
            }
        }
    }
}

// =============================================================================
// Replay Stream
// =============================================================================

#[async_trait::async_trait]
impl ReplayFeed for TardisMachineClient {
    async fn subscribe_replay(
        &self,
        subscription: &FeedSubscription,
        window: &ReplayWindow,
    ) -> Result<FeedStream, FeedError> {
        let url = self.replay_url(subscription, window)?;
        let ws = connect(&url).await?;
        let codec = self.codec.clone();

        let stream = ws
            .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(move |frame| future::ready(replay_frame(&codec, frame)));
        Ok(stream.boxed())
    }
}

fn replay_frame(
    codec: &JsonCodec,
    frame: Result<Message, tungstenite::Error>,
) -> Option<Result<FeedMessage, FeedError>> {
    match frame {
        Ok(Message::Text(text)) => decode_frame(codec, text.as_str()).map(Ok),
        Ok(_) => None,
        Err(e) => Some(Err(FeedError::ConnectionLost(e.to_string()))),
    }
}

// =============================================================================
// Tests
// =============================================================================
