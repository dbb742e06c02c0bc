//! Hub service — connection registry, handler dispatch, and broadcast.
//!
//! DESIGN
//! ======
//! A `Channel` pairs one store with the set of clients watching it. Inbound
//! events are looked up in the channel's handler table; the handler mutates
//! the store and returns an `Outcome`. Handlers never send frames directly.
//!
//! ORDERING
//! ========
//! The store mutex is held from handler entry until the outcome has been
//! queued on every client sender. Snapshots pushed on join are queued under
//! the same mutex. Each client therefore sees mutations in the order they
//! were applied, and never sees a broadcast older than its snapshot.
//!
//! Queues are bounded; `try_send` skips a client whose queue is full or
//! closed so one slow socket never stalls the others.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{ErrorCode, Frame};

// =============================================================================
// TYPES
// =============================================================================

/// State owned by a channel.
pub trait Store: Send + 'static {
    /// Full snapshot frame, sent on join and on `request_state`.
    fn snapshot(&self) -> Frame;
}

/// Result returned by handler functions. The hub uses this to decide who
/// receives what.
#[derive(Debug)]
pub enum Outcome {
    /// Send to every client on the channel, sender included. The sender's
    /// copy carries `parent_id` for correlation.
    Broadcast(Frame),
    /// Send to the sender only.
    Reply(Frame),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },
    #[error(transparent)]
    Game(#[from] crate::services::game::GameError),
}

impl ErrorCode for DispatchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "E_MALFORMED_PAYLOAD",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::MalformedPayload { .. } => "E_MALFORMED_PAYLOAD",
            Self::Game(e) => e.error_code(),
        }
    }
}

/// Pure mutation function: current store + request frame → outcome.
pub type Handler<S> = fn(&mut S, &Frame) -> Result<Outcome, DispatchError>;

/// Event name → handler.
pub type HandlerTable<S> = &'static [(&'static str, Handler<S>)];

// =============================================================================
// CHANNEL
// =============================================================================

pub struct Channel<S: 'static> {
    name: &'static str,
    store: Arc<Mutex<S>>,
    /// Connected clients: `client_id` -> sender for outgoing frames.
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>>,
    handlers: HandlerTable<S>,
}

impl<S: 'static> Clone for Channel<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            store: Arc::clone(&self.store),
            clients: Arc::clone(&self.clients),
            handlers: self.handlers,
        }
    }
}

impl<S: Store> Channel<S> {
    #[must_use]
    pub fn new(name: &'static str, store: S, handlers: HandlerTable<S>) -> Self {
        Self { name, store: Arc::new(Mutex::new(store)), clients: Arc::new(RwLock::new(HashMap::new())), handlers }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up the handler registered for `event`.
    #[must_use]
    pub fn handler(&self, event: &str) -> Option<Handler<S>> {
        self.handlers
            .iter()
            .find(|(name, _)| *name == event)
            .map(|(_, handler)| *handler)
    }

    /// Lock the store for inspection.
    #[cfg(test)]
    pub async fn store(&self) -> tokio::sync::MutexGuard<'_, S> {
        self.store.lock().await
    }

    /// Register a client and queue the current snapshot for it.
    pub async fn join(&self, client_id: Uuid, tx: mpsc::Sender<Frame>) {
        let store = self.store.lock().await;
        let snapshot = store.snapshot();
        let mut clients = self.clients.write().await;
        if tx.try_send(snapshot).is_err() {
            warn!(channel = self.name, %client_id, "hub: snapshot not queued");
        }
        clients.insert(client_id, tx);
        info!(channel = self.name, %client_id, clients = clients.len(), "client joined");
    }

    /// Deregister a client. State is global, so nothing else is cleaned up.
    pub async fn part(&self, client_id: Uuid) {
        let mut clients = self.clients.write().await;
        if clients.remove(&client_id).is_some() {
            info!(channel = self.name, %client_id, remaining = clients.len(), "client left");
        }
    }

    #[cfg(test)]
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Run the handler for `req` and deliver its outcome.
    ///
    /// Replies and errors go to `reply_tx`; broadcasts go to every registered
    /// client. Errors never reach other clients.
    pub async fn dispatch(&self, client_id: Uuid, reply_tx: &mpsc::Sender<Frame>, req: &Frame) {
        let Some(handler) = self.handler(&req.event) else {
            let err = DispatchError::UnknownEvent(req.event.clone());
            warn!(channel = self.name, %client_id, error = %err, "hub: rejected event");
            self.reply(client_id, reply_tx, req.error_from(&err));
            return;
        };

        let mut store = self.store.lock().await;
        match handler(&mut *store, req) {
            Ok(Outcome::Broadcast(frame)) => self.broadcast(&frame, client_id, req.id).await,
            Ok(Outcome::Reply(frame)) => self.reply(client_id, reply_tx, frame.with_parent(req.id)),
            Err(err) => {
                warn!(channel = self.name, %client_id, event = %req.event, error = %err, "hub: rejected event");
                self.reply(client_id, reply_tx, req.error_from(&err));
            }
        }
        drop(store);
    }

    fn reply(&self, client_id: Uuid, reply_tx: &mpsc::Sender<Frame>, frame: Frame) {
        if reply_tx.try_send(frame).is_err() {
            debug!(channel = self.name, %client_id, "hub: reply dropped");
        }
    }

    /// Send `frame` to every client. The sender's copy is correlated to its request.
    async fn broadcast(&self, frame: &Frame, sender: Uuid, request_id: Uuid) {
        let clients = self.clients.read().await;
        for (client_id, tx) in clients.iter() {
            let outgoing = if *client_id == sender { frame.clone().with_parent(request_id) } else { frame.clone() };
            // Best-effort: if a client's channel is full, skip it.
            if tx.try_send(outgoing).is_err() {
                debug!(channel = self.name, %client_id, event = %frame.event, "hub: broadcast skipped");
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
