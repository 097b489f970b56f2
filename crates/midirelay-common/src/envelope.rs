//! The `{event, data}` unit exchanged over the wire.
//!
//! One envelope travels as one WebSocket text frame:
//!
//! ```json
//! { "event": "noteOn", "data": { "note": 40, "velocity": 100 } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DecodeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to the textual wire form.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a text frame.
    ///
    /// The frame must be a JSON object with a non-empty string `event`.
    /// A missing `data` field decodes as `null`.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(frame)?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::MissingEvent);
        };

        let event = match fields.remove("event") {
            Some(Value::String(event)) => event,
            _ => return Err(DecodeError::MissingEvent),
        };
        if event.trim().is_empty() {
            return Err(DecodeError::EmptyEvent);
        }

        let data = fields.remove("data").unwrap_or(Value::Null);
        Ok(Self { event, data })
    }

    /// Parse a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(frame: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotUtf8)?;
        Self::decode(text)
    }
}
