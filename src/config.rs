//! Server configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "*";
pub const DEFAULT_BOARD_WIDTH: f64 = 600.0;
pub const DEFAULT_BOARD_HEIGHT: f64 = 600.0;
pub const DEFAULT_TOKEN_RADIUS: f64 = 15.0;
pub const DEFAULT_TOKENS_PER_COLOR: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("board {width}x{height} cannot hold tokens of radius {radius}")]
    Geometry { width: f64, height: f64, radius: f64 },
}

/// Canvas dimensions and token size used for position clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardGeometry {
    pub width: f64,
    pub height: f64,
    pub token_radius: f64,
}

impl Default for BoardGeometry {
    fn default() -> Self {
        Self { width: DEFAULT_BOARD_WIDTH, height: DEFAULT_BOARD_HEIGHT, token_radius: DEFAULT_TOKEN_RADIUS }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// `*` allows any origin.
    pub allowed_origin: String,
    /// Shared secret for the gated variant. `None` skips authentication.
    pub password: Option<String>,
    pub geometry: BoardGeometry,
    pub tokens_per_color: u32,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            password: None,
            geometry: BoardGeometry::default(),
            tokens_per_color: DEFAULT_TOKENS_PER_COLOR,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Build typed server config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 5555
    /// - `ALLOWED_ORIGIN` (or `CLIENT_ORIGIN`): default `*`
    /// - `SECRET_GAME_PASSWORD`: unset or empty disables the password gate
    /// - `BOARD_WIDTH` / `BOARD_HEIGHT`: default 600
    /// - `TOKEN_RADIUS`: default 15
    /// - `TOKENS_PER_COLOR`: default 4
    /// - `STATIC_DIR`: directory served as the HTTP fallback
    ///
    /// # Errors
    ///
    /// `Invalid` when a numeric variable does not parse; `Geometry` when the
    /// board cannot hold a token of the configured radius.
    pub fn from_env() -> Result<Self, ConfigError> {
        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .or_else(|_| std::env::var("CLIENT_ORIGIN"))
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGIN.to_string());
        let password = std::env::var("SECRET_GAME_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        let geometry = BoardGeometry {
            width: env_parse("BOARD_WIDTH", DEFAULT_BOARD_WIDTH)?,
            height: env_parse("BOARD_HEIGHT", DEFAULT_BOARD_HEIGHT)?,
            token_radius: env_parse("TOKEN_RADIUS", DEFAULT_TOKEN_RADIUS)?,
        };
        validate_geometry(geometry)?;

        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT)?,
            allowed_origin,
            password,
            geometry,
            tokens_per_color: env_parse("TOKENS_PER_COLOR", DEFAULT_TOKENS_PER_COLOR)?,
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
        })
    }

    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origin == "*"
    }
}

fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn validate_geometry(geometry: BoardGeometry) -> Result<(), ConfigError> {
    let BoardGeometry { width, height, token_radius: radius } = geometry;
    let fits = radius.is_finite()
        && radius >= 0.0
        && width.is_finite()
        && height.is_finite()
        && width >= 2.0 * radius
        && height >= 2.0 * radius;
    if fits { Ok(()) } else { Err(ConfigError::Geometry { width, height, radius }) }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
