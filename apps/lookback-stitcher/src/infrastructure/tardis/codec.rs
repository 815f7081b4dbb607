//! Normalized Message Codec
//!
//! Decodes tardis-machine text frames into feed messages. Each frame holds
//! one JSON object tagged by its `type` field.

use super::messages::{BookSnapshotMessage, DisconnectMessage, message_type};
use crate::application::ports::{DisconnectNotice, FeedMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for normalized tardis-machine messages.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// Returns `Ok(None)` for message types that have no record shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a `type`
    /// field, or a known type fails to parse.
    pub fn decode(&self, text: &str) -> Result<Option<FeedMessage>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let Some(msg_type) = value.get("type").and_then(serde_json::Value::as_str) else {
            return Err(CodecError::InvalidFormat(format!(
                "missing type field: {}...",
                text.chars().take(50).collect::<String>()
            )));
        };

        match msg_type {
            message_type::BOOK_SNAPSHOT => {
                let m: BookSnapshotMessage = serde_json::from_value(value)?;
                let (event, dropped) = m.into_event();
                if dropped > 0 {
                    tracing::debug!(
                        symbol = %event.symbol,
                        name = %event.name,
                        dropped,
                        "Dropped book levels beyond supported depth"
                    );
                }
                Ok(Some(FeedMessage::Event(event)))
            }
            message_type::DISCONNECT => {
                let m: DisconnectMessage = serde_json::from_value(value)?;
                Ok(Some(FeedMessage::Disconnect(DisconnectNotice {
                    exchange: m.exchange,
                    local_timestamp: m.local_timestamp,
                })))
            }
            other => {
                tracing::trace!(msg_type = other, "Ignoring unsupported message type");
                Ok(None)
            }
        }
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}
