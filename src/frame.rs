//! Frame — the envelope for every websocket message.
//!
//! ARCHITECTURE
//! ============
//! Clients and server exchange named events over a persistent websocket.
//! Each text message is one JSON frame carrying an `event` name and a flat
//! `data` payload. Replies correlate to the request that caused them via
//! `parent_id`; broadcasts carry no `parent_id`.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>` at the top level.
//! - Inbound frames may omit everything except `event`; missing fields get
//!   defaults so a browser client can send `{"event": "roll_dice"}`.
//! - The dispatcher routes on `event` and hands `data` to the handler, which
//!   owns payload validation.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Event name for error replies.
pub const EVENT_ERROR: &str = "error";

/// Event name for the server-side teardown notice.
pub const EVENT_DISCONNECT: &str = "disconnect";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default = "now_ms")]
    pub ts: i64,
    pub event: String,
    #[serde(default)]
    pub data: Data,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a fresh frame with no correlation. Used for requests and broadcasts.
    pub fn new(event: impl Into<String>, data: Data) -> Self {
        Self { id: Uuid::new_v4(), parent_id: None, ts: now_ms(), event: event.into(), data }
    }

    /// Create a frame whose data is the serialized form of `payload`.
    ///
    /// Non-object payloads land under a `value` key so the data stays flat.
    pub fn from_payload(event: impl Into<String>, payload: &impl Serialize) -> Self {
        let data = match serde_json::to_value(payload) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            Ok(other) => Data::from([("value".to_string(), other)]),
            Err(_) => Data::new(),
        };
        Self::new(event, data)
    }

    /// Create a reply to this frame under a different event name.
    #[must_use]
    pub fn reply(&self, event: impl Into<String>, data: Data) -> Self {
        Self { parent_id: Some(self.id), ..Self::new(event, data) }
    }

    /// Create an uncorrelated `error` frame from a typed error. Used when the
    /// inbound text could not be parsed into a frame at all.
    pub fn failure(err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_CODE.into(), serde_json::Value::String(err.error_code().to_string()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(err.to_string()));
        Self::new(EVENT_ERROR, data)
    }

    /// Create a structured `error` reply from a typed error.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::failure(err).with_parent(self.id)
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// The payload as a JSON object, for typed deserialization.
    #[must_use]
    pub fn data_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.data.clone().into_iter().collect())
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
