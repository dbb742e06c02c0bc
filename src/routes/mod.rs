//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two websocket endpoints share one listener: `/ws` carries the Amdavad
//! game, `/sync` carries the shared-message demo. `/healthz` answers load
//! balancer probes. When `STATIC_DIR` is set, every other path is served
//! from that directory so the browser client can ship alongside the server.
//!
//! SHUTDOWN
//! ========
//! Upgraded sockets leave hyper's connection tracking, so graceful shutdown
//! alone would not wait for them. `serve` cancels the shared token when the
//! signal fires, then waits (bounded) for every socket task to send its
//! `disconnect` notice and close.

pub mod events;
pub mod ws;

use std::future::Future;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let mut router = Router::new()
        .route("/ws", get(ws::handle_game_ws))
        .route("/sync", get(ws::handle_sync_ws))
        .route("/healthz", get(healthz));

    if let Some(dir) = &state.config.static_dir {
        tracing::info!(dir = %dir.display(), "serving static files");
        router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    router
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// How long shutdown waits for open sockets to close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `state` on `listener` until `signal` resolves, then drain sockets.
///
/// # Errors
///
/// Returns the listener's I/O error if serving fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown = state.shutdown.clone();
    let tasks = state.tasks.clone();

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            signal.await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    tasks.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, tasks.wait()).await.is_err() {
        tracing::warn!(remaining = tasks.len(), "shutdown: sockets still open after drain timeout");
    }
    Ok(())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }
    match HeaderValue::from_str(&config.allowed_origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(origin = %config.allowed_origin, error = %e, "invalid allowed origin; cross-origin requests refused");
            cors
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
