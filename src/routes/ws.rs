//! WebSocket handler — per-connection state machine and frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse → auth gate or channel dispatch
//! - Frames queued for this client (replies, broadcasts) → forward to socket
//!
//! Every outbound frame, including replies to this client, goes through the
//! client's queue so the socket sees them in the order the hub produced them.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (origin checked) → `Authenticating`, or `Active` when no
//!    password is configured
//! 2. `auth` ok → `auth_result {success: true}`, join channel, snapshot pushed
//! 3. `auth` wrong → `auth_result {success: false}`, `disconnect`, close
//! 4. Active frames → channel dispatch → reply / broadcast
//! 5. Close → part channel
//! 6. Server shutdown → queued frames flushed, `disconnect`, close, part

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header::ORIGIN};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::frame::{Data, EVENT_DISCONNECT, EVENT_ERROR, FRAME_CODE, FRAME_MESSAGE, Frame};
use crate::routes::events::{AuthPayload, EVENT_AUTH, EVENT_AUTH_RESULT, parse_payload};
use crate::services::auth::{AuthError, PasswordGate};
use crate::services::hub::{Channel, DispatchError, Store};
use crate::state::AppState;

/// Per-connection outbound queue depth.
const CLIENT_QUEUE: usize = 256;

/// `disconnect` reason sent to every socket when the server stops.
pub const SHUTDOWN_REASON: &str = "server shutting down";

// =============================================================================
// PHASE
// =============================================================================

/// Where a connection is in its lifecycle. `Connecting` ends at upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticating,
    Active,
    Disconnected,
}

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /ws` — the Amdavad game channel, behind the password gate.
pub async fn handle_game_ws(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if !origin_allowed(&state.config, &headers) {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    let channel = state.game.clone();
    let gate = state.gate.clone();
    let shutdown = state.shutdown.clone();
    let tasks = state.tasks.clone();
    ws.on_upgrade(move |socket| tasks.track_future(run_ws(socket, channel, gate, shutdown)))
}

/// `GET /sync` — the shared-message channel. Never gated.
pub async fn handle_sync_ws(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if !origin_allowed(&state.config, &headers) {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    let channel = state.sync.clone();
    let shutdown = state.shutdown.clone();
    let tasks = state.tasks.clone();
    ws.on_upgrade(move |socket| tasks.track_future(run_ws(socket, channel, PasswordGate::default(), shutdown)))
}

/// Browsers always send `Origin`; other clients may omit it and are let through.
fn origin_allowed(config: &ServerConfig, headers: &HeaderMap) -> bool {
    if config.allows_any_origin() {
        return true;
    }
    match headers.get(ORIGIN) {
        Some(origin) => origin
            .to_str()
            .is_ok_and(|o| o.trim_end_matches('/') == config.allowed_origin.trim_end_matches('/')),
        None => true,
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws<S: Store>(mut socket: WebSocket, channel: Channel<S>, gate: PasswordGate, shutdown: CancellationToken) {
    let client_id = Uuid::new_v4();

    // Per-connection queue for replies and broadcasts.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_QUEUE);

    let mut conn = Connection::new(client_id, channel, gate, client_tx);
    conn.open().await;
    info!(%client_id, channel = conn.channel.name(), phase = ?conn.phase, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        if conn.process_inbound_text(text.as_str()).await == Phase::Disconnected {
                            // auth_result + disconnect are already queued.
                            flush_and_close(&mut socket, &mut client_rx).await;
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            () = shutdown.cancelled() => {
                conn.close().await;
                conn.queue(disconnect(SHUTDOWN_REASON));
                flush_and_close(&mut socket, &mut client_rx).await;
                break;
            }
        }
    }

    conn.close().await;
    info!(%client_id, "ws: client disconnected");
}

/// Transport-free connection state. Tests drive this directly.
pub(crate) struct Connection<S: 'static> {
    client_id: Uuid,
    phase: Phase,
    channel: Channel<S>,
    gate: PasswordGate,
    tx: mpsc::Sender<Frame>,
}

impl<S: Store> Connection<S> {
    pub(crate) fn new(client_id: Uuid, channel: Channel<S>, gate: PasswordGate, tx: mpsc::Sender<Frame>) -> Self {
        Self { client_id, phase: Phase::Authenticating, channel, gate, tx }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Skip authentication when the gate is open.
    pub(crate) async fn open(&mut self) {
        if self.gate.is_open() {
            self.activate().await;
        }
    }

    /// Parse and process one inbound text frame. Returns the resulting phase.
    pub(crate) async fn process_inbound_text(&mut self, text: &str) -> Phase {
        let req: Frame = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                let err = DispatchError::from(e);
                warn!(client_id = %self.client_id, error = %err, "ws: invalid inbound frame");
                self.queue(Frame::failure(&err));
                return self.phase;
            }
        };

        info!(client_id = %self.client_id, id = %req.id, event = %req.event, "ws: recv frame");

        match self.phase {
            Phase::Disconnected => {}
            _ if req.event == EVENT_AUTH => self.handle_auth(&req).await,
            Phase::Authenticating => {
                let err = AuthError::Required;
                warn!(client_id = %self.client_id, event = %req.event, "ws: event before auth");
                self.queue(req.error_from(&err));
            }
            Phase::Active => self.channel.dispatch(self.client_id, &self.tx, &req).await,
        }
        self.phase
    }

    async fn handle_auth(&mut self, req: &Frame) {
        if self.phase == Phase::Active {
            self.queue(auth_result(req, true));
            return;
        }

        let payload: AuthPayload = match parse_payload(req) {
            Ok(p) => p,
            Err(err) => {
                warn!(client_id = %self.client_id, error = %err, "ws: malformed auth");
                self.queue(req.error_from(&err));
                return;
            }
        };

        match self.gate.verify(&payload.password) {
            Ok(()) => {
                info!(client_id = %self.client_id, "ws: auth accepted");
                self.queue(auth_result(req, true));
                self.activate().await;
            }
            Err(err) => {
                warn!(client_id = %self.client_id, "ws: auth rejected");
                self.queue(auth_result(req, false));
                self.queue(disconnect(&err.to_string()));
                self.phase = Phase::Disconnected;
            }
        }
    }

    async fn activate(&mut self) {
        self.channel.join(self.client_id, self.tx.clone()).await;
        self.phase = Phase::Active;
    }

    /// Deregister from the channel. Safe to call more than once.
    pub(crate) async fn close(&mut self) {
        if self.phase == Phase::Active {
            self.channel.part(self.client_id).await;
        }
        self.phase = Phase::Disconnected;
    }

    fn queue(&self, frame: Frame) {
        if self.tx.try_send(frame).is_err() {
            warn!(client_id = %self.client_id, "ws: outbound queue full, frame dropped");
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn disconnect(reason: &str) -> Frame {
    Frame::new(EVENT_DISCONNECT, Data::new()).with_data("reason", reason)
}

/// Write whatever is still queued, then close the socket.
async fn flush_and_close(socket: &mut WebSocket, client_rx: &mut mpsc::Receiver<Frame>) {
    while let Ok(frame) = client_rx.try_recv() {
        if send_frame(socket, &frame).await.is_err() {
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

fn auth_result(req: &Frame, success: bool) -> Frame {
    req.reply(EVENT_AUTH_RESULT, Data::new()).with_data("success", success)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.event == EVENT_ERROR {
        let code = frame
            .data
            .get(FRAME_CODE)
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let message = frame
            .data
            .get(FRAME_MESSAGE)
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, code, message, "ws: send error frame");
    } else {
        info!(id = %frame.id, event = %frame.event, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
