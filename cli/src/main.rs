use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

type Stream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("timed out waiting for websocket frame")]
    Timeout,
    #[error("password rejected")]
    AuthRejected,
    #[error("server returned error for {event}: {code}: {message}")]
    ServerError { event: String, code: String, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("update payload must be a JSON object")]
    NotAnObject,
}

impl From<tokio_tungstenite::tungstenite::Error> for CliError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

#[derive(Parser, Debug)]
#[command(name = "amdavad", about = "Amdavad game server websocket CLI")]
struct Cli {
    #[arg(long, env = "AMDAVAD_URL", default_value = "http://127.0.0.1:5555")]
    url: String,

    #[arg(long, env = "SECRET_GAME_PASSWORD")]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the health endpoint.
    Ping,
    /// Print the current game state.
    State,
    /// Roll the dice.
    Roll,
    /// Place a new token from a color's pool.
    Place {
        color: TokenColor,
        x: f64,
        y: f64,
    },
    /// Move an existing token.
    Move {
        token_id: String,
        x: f64,
        y: f64,
    },
    /// Reset the game.
    Reset,
    /// Print every frame the server sends until interrupted.
    Watch {
        #[arg(long, default_value_t = false)]
        sync: bool,
    },
    /// Replace the shared-message document.
    Update {
        /// Plain text stored under `message`.
        message: Option<String>,
        /// Full JSON object; overrides `message`.
        #[arg(long)]
        data: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum TokenColor {
    Red,
    Blue,
    Green,
    Yellow,
}

impl TokenColor {
    fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Yellow => "yellow",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let password = cli.password.as_deref().filter(|p| !p.is_empty());

    match cli.command {
        Command::Ping => run_ping(&cli.url).await,
        Command::State => run_game(&cli.url, password, "request_state", Map::new()).await,
        Command::Roll => run_game(&cli.url, password, "roll_dice", Map::new()).await,
        Command::Place { color, x, y } => {
            let data = object(json!({ "color": color.as_str(), "x": x, "y": y, "is_new": true }));
            run_game(&cli.url, password, "move_token", data).await
        }
        Command::Move { token_id, x, y } => {
            let data = object(json!({ "token_id": token_id, "x": x, "y": y }));
            run_game(&cli.url, password, "move_token", data).await
        }
        Command::Reset => run_game(&cli.url, password, "reset_game", Map::new()).await,
        Command::Watch { sync } => run_watch(&cli.url, password, sync).await,
        Command::Update { message, data } => {
            let document = update_document(message, data.as_deref())?;
            let mut stream = open(&cli.url, "/sync", None).await?;
            let reply = request(&mut stream, "update", document).await?;
            print_json(&reply)
        }
    }
}

async fn run_ping(base_url: &str) -> Result<(), CliError> {
    let client = reqwest::Client::new();
    let url = format!("{}/healthz", base_url.trim_end_matches('/'));
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::ServerError {
            event: "healthz".to_owned(),
            code: format!("HTTP {}", status.as_u16()),
            message: "health check failed".to_owned(),
        });
    }
    println!("ok");
    Ok(())
}

async fn run_game(base_url: &str, password: Option<&str>, event: &str, data: Map<String, Value>) -> Result<(), CliError> {
    let mut stream = open(base_url, "/ws", password).await?;
    let reply = request(&mut stream, event, data).await?;
    stream.close(None).await?;
    print_json(&reply)
}

async fn run_watch(base_url: &str, password: Option<&str>, sync: bool) -> Result<(), CliError> {
    let path = if sync { "/sync" } else { "/ws" };
    let mut stream = open(base_url, path, password).await?;
    loop {
        let Some(message) = stream.next().await else {
            return Ok(());
        };
        match message? {
            Message::Text(text) => {
                let frame = serde_json::from_str::<Value>(text.as_str())?;
                let event = frame.get("event").and_then(Value::as_str).unwrap_or("?");
                let data = frame.get("data").cloned().unwrap_or(Value::Null);
                println!("{event} {data}");
            }
            Message::Close(_) => return Ok(()),
            _ => {}
        }
    }
}

/// Connect and, when a password is given, authenticate.
async fn open(base_url: &str, path: &str, password: Option<&str>) -> Result<Stream, CliError> {
    let (mut stream, _) = connect_async(ws_url(base_url, path)?).await?;
    if let Some(password) = password {
        let reply = request(&mut stream, "auth", object(json!({ "password": password }))).await?;
        if reply.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(CliError::AuthRejected);
        }
    }
    Ok(stream)
}

/// Send one event and wait for the frame correlated to it. Returns its data.
async fn request(stream: &mut Stream, event: &str, data: Map<String, Value>) -> Result<Value, CliError> {
    let frame = request_frame(event, data);
    let id = frame.get("id").and_then(Value::as_str).unwrap_or_default().to_owned();
    stream.send(Message::Text(frame.to_string().into())).await?;

    loop {
        let reply = recv_next(stream, REPLY_TIMEOUT).await?;
        if reply.get("parent_id").and_then(Value::as_str) != Some(id.as_str()) {
            continue;
        }
        let data = reply.get("data").cloned().unwrap_or(Value::Null);
        if reply.get("event").and_then(Value::as_str) == Some("error") {
            let field = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("unknown").to_owned();
            return Err(CliError::ServerError { event: event.to_owned(), code: field("code"), message: field("message") });
        }
        return Ok(data);
    }
}

async fn recv_next(stream: &mut Stream, timeout: Duration) -> Result<Value, CliError> {
    let fut = async {
        loop {
            let Some(message) = stream.next().await else {
                return Err(CliError::WsClosed);
            };
            match message? {
                Message::Text(text) => return Ok(serde_json::from_str::<Value>(text.as_str())?),
                Message::Close(_) => return Err(CliError::WsClosed),
                _ => {}
            }
        }
    };

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CliError::Timeout)?
}

fn ws_url(base_url: &str, path: &str) -> Result<String, CliError> {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("http://") {
        return Ok(format!("ws://{rest}{path}"));
    }
    if let Some(rest) = base.strip_prefix("https://") {
        return Ok(format!("wss://{rest}{path}"));
    }
    if base.starts_with("ws://") || base.starts_with("wss://") {
        return Ok(format!("{base}{path}"));
    }

    Err(CliError::InvalidBaseUrl(base_url.to_owned()))
}

fn request_frame(event: &str, data: Map<String, Value>) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "ts": now_ms(),
        "event": event,
        "data": data,
    })
}

fn update_document(message: Option<String>, data: Option<&str>) -> Result<Map<String, Value>, CliError> {
    if let Some(raw) = data {
        return match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(CliError::NotAnObject),
        };
    }
    Ok(object(json!({ "message": message.unwrap_or_default() })))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn now_ms() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_millis()).unwrap_or(0)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
