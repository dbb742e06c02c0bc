//! Sync service — one shared JSON document, replaced wholesale.
//!
//! Any client may send `update` with a new document; the server keeps it and
//! broadcasts it as `state`. No merging: the last update wins.

use serde_json::{Map, Value};

use crate::frame::Frame;
use crate::services::hub::Store;

pub const EVENT_STATE: &str = "state";

pub const DEFAULT_MESSAGE: &str = "Hello everyone";

#[derive(Debug, Clone, PartialEq)]
pub struct SharedMessage {
    document: Map<String, Value>,
}

impl SharedMessage {
    #[must_use]
    pub fn new() -> Self {
        let mut document = Map::new();
        document.insert("message".into(), Value::String(DEFAULT_MESSAGE.into()));
        Self { document }
    }

    #[cfg(test)]
    #[must_use]
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Replace the document and return the stored copy.
    pub fn update(&mut self, document: Map<String, Value>) -> &Map<String, Value> {
        self.document = document;
        &self.document
    }
}

impl Default for SharedMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for SharedMessage {
    fn snapshot(&self) -> Frame {
        Frame::new(EVENT_STATE, self.document.clone().into_iter().collect())
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
