//! Event handler tables and payload schemas.
//!
//! DESIGN
//! ======
//! Each channel has a static table mapping event name → handler. Handlers
//! validate the payload into a typed struct first and only then touch the
//! store, so a malformed event never leaves a half-applied mutation.
//! `auth` is not in any table: it is handled by the connection state
//! machine in `ws.rs` before a client reaches the channel.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::frame::Frame;
use crate::services::game::{
    Color, EVENT_DICE_ROLLED, EVENT_GAME_RESET, EVENT_TOKENS_UPDATED, GameStore, TokenMove,
};
use crate::services::hub::{DispatchError, HandlerTable, Outcome, Store};
use crate::services::sync::{EVENT_STATE, SharedMessage};

pub const EVENT_AUTH: &str = "auth";
pub const EVENT_AUTH_RESULT: &str = "auth_result";
pub const EVENT_REQUEST_STATE: &str = "request_state";
pub const EVENT_ROLL_DICE: &str = "roll_dice";
pub const EVENT_MOVE_TOKEN: &str = "move_token";
pub const EVENT_RESET_GAME: &str = "reset_game";
pub const EVENT_UPDATE: &str = "update";

// =============================================================================
// TABLES
// =============================================================================

pub static GAME_HANDLERS: HandlerTable<GameStore> = &[
    (EVENT_REQUEST_STATE, request_state::<GameStore>),
    (EVENT_ROLL_DICE, roll_dice),
    (EVENT_MOVE_TOKEN, move_token),
    (EVENT_RESET_GAME, reset_game),
];

pub static SYNC_HANDLERS: HandlerTable<SharedMessage> = &[
    (EVENT_REQUEST_STATE, request_state::<SharedMessage>),
    (EVENT_UPDATE, update_message),
];

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub password: String,
}

/// `move_token` payload. `color` and `is_new` are only needed on first
/// placement; `token_id` only when moving an existing token.
#[derive(Debug, Deserialize)]
pub struct MoveTokenPayload {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub color: Option<Color>,
    pub x: f64,
    pub y: f64,
    #[serde(default, alias = "isNew")]
    pub is_new: bool,
}

impl TryFrom<MoveTokenPayload> for TokenMove {
    type Error = String;

    fn try_from(payload: MoveTokenPayload) -> Result<Self, Self::Error> {
        let MoveTokenPayload { token_id, color, x, y, is_new } = payload;
        if !x.is_finite() || !y.is_finite() {
            return Err("x and y must be finite numbers".into());
        }
        if is_new {
            let color = color.ok_or("color required for a new token")?;
            return Ok(TokenMove::Place { color, x, y });
        }
        match token_id {
            Some(token_id) if !token_id.is_empty() => Ok(TokenMove::Move { token_id, x, y }),
            _ => Err("token_id required".into()),
        }
    }
}

/// Deserialize the frame's data into `T`.
///
/// # Errors
///
/// `MalformedPayload` naming the event and the serde failure.
pub fn parse_payload<T: DeserializeOwned>(req: &Frame) -> Result<T, DispatchError> {
    serde_json::from_value(req.data_value()).map_err(|e| malformed(req, e.to_string()))
}

fn malformed(req: &Frame, reason: impl Into<String>) -> DispatchError {
    DispatchError::MalformedPayload { event: req.event.clone(), reason: reason.into() }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn request_state<S: Store>(store: &mut S, _req: &Frame) -> Result<Outcome, DispatchError> {
    Ok(Outcome::Reply(store.snapshot()))
}

fn roll_dice(store: &mut GameStore, _req: &Frame) -> Result<Outcome, DispatchError> {
    let rolled = store.roll_dice();
    Ok(Outcome::Broadcast(Frame::from_payload(EVENT_DICE_ROLLED, &rolled)))
}

fn move_token(store: &mut GameStore, req: &Frame) -> Result<Outcome, DispatchError> {
    let payload: MoveTokenPayload = parse_payload(req)?;
    let request = TokenMove::try_from(payload).map_err(|reason| malformed(req, reason))?;
    let updated = store.move_token(request)?;
    Ok(Outcome::Broadcast(Frame::from_payload(EVENT_TOKENS_UPDATED, &updated)))
}

fn reset_game(store: &mut GameStore, _req: &Frame) -> Result<Outcome, DispatchError> {
    let state = store.reset();
    Ok(Outcome::Broadcast(Frame::from_payload(EVENT_GAME_RESET, state)))
}

fn update_message(store: &mut SharedMessage, req: &Frame) -> Result<Outcome, DispatchError> {
    let document = store.update(req.data.clone().into_iter().collect());
    Ok(Outcome::Broadcast(Frame::new(EVENT_STATE, document.clone().into_iter().collect())))
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
