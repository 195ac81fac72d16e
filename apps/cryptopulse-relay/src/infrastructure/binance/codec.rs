//! Stream Codec Module
//!
//! Decodes text frames from the exchange stream. Frames are single JSON
//! objects; the `e` field carries the event type. When the stream is opened in
//! combined mode, events arrive wrapped as `{"stream": ..., "data": {...}}` and
//! are unwrapped here.

use serde_json::Value;

use super::messages::{ControlReply, TICKER_EVENT_TYPE, TickerEvent, UpstreamMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed or a required field was missing.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was valid JSON but not a recognised message shape.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the exchange market stream.
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
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, not an object, or a ticker
    /// event is missing required fields.
    pub fn decode(&self, text: &str) -> Result<UpstreamMessage, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let value = unwrap_combined(value);

        let Some(object) = value.as_object() else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(text)
            )));
        };

        if let Some(event_type) = object.get("e").and_then(Value::as_str) {
            if event_type == TICKER_EVENT_TYPE {
                let event: TickerEvent = serde_json::from_value(value)?;
                return Ok(UpstreamMessage::Ticker(Box::new(event)));
            }
            return Ok(UpstreamMessage::Other {
                event_type: event_type.to_string(),
            });
        }

        if object.contains_key("id") || object.contains_key("result") || object.contains_key("error")
        {
            let reply: ControlReply = serde_json::from_value(value)?;
            return Ok(UpstreamMessage::Reply(reply));
        }

        Err(CodecError::InvalidFormat(format!(
            "unrecognised frame: {}",
            preview(text)
        )))
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

fn unwrap_combined(value: Value) -> Value {
    match value {
        Value::Object(mut object) if object.contains_key("stream") && object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn preview(text: &str) -> String {
    text.trim().chars().take(50).collect()
}
