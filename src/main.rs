mod config;
mod frame;
mod routes;
mod services;
mod state;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("server io: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env()?;
    let port = config.port;
    if config.password.is_none() {
        tracing::warn!("SECRET_GAME_PASSWORD not set; game channel is open to anyone");
    }
    tracing::info!(
        origin = %config.allowed_origin,
        width = config.geometry.width,
        height = config.geometry.height,
        tokens_per_color = config.tokens_per_color,
        "config loaded"
    );

    let state = state::AppState::new(config);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "amdavad listening");
    routes::serve(listener, state, shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

/// Resolve on ctrl-c. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
