//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the parsed config, the password gate, and one `Channel` per demo:
//! the Amdavad game and the shared-message sync app. Each channel owns its
//! store and its connected clients; nothing is persisted.
//!
//! Socket tasks are spawned through `tasks` and watch `shutdown`, so the
//! server can tell every connection to say goodbye and wait for it to do so.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::routes::events::{GAME_HANDLERS, SYNC_HANDLERS};
use crate::services::auth::PasswordGate;
use crate::services::game::GameStore;
use crate::services::hub::Channel;
use crate::services::sync::SharedMessage;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum: all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub gate: PasswordGate,
    pub game: Channel<GameStore>,
    pub sync: Channel<SharedMessage>,
    /// Cancelled once when the server begins shutting down.
    pub shutdown: CancellationToken,
    /// Every live websocket task.
    pub tasks: TaskTracker,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let gate = PasswordGate::new(config.password.as_deref());
        let game = Channel::new("game", GameStore::new(config.geometry, config.tokens_per_color), GAME_HANDLERS);
        let sync = Channel::new("sync", SharedMessage::new(), SYNC_HANDLERS);
        Self {
            config: Arc::new(config),
            gate,
            game,
            sync,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
