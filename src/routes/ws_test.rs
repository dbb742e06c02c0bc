use super::*;
use crate::frame::EVENT_ERROR;
use crate::services::game::GameStore;
use crate::state::test_helpers::{self, assert_no_frame, recv_frame};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite;

fn connection(state: &AppState) -> (Connection<GameStore>, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(32);
    let conn = Connection::new(Uuid::new_v4(), state.game.clone(), state.gate.clone(), tx);
    (conn, rx)
}

// =============================================================================
// CONNECTION STATE MACHINE
// =============================================================================

#[tokio::test]
async fn open_gate_activates_immediately_with_snapshot() {
    let state = test_helpers::test_app_state();
    let (mut conn, mut rx) = connection(&state);

    conn.open().await;

    assert_eq!(conn.phase(), Phase::Active);
    assert_eq!(recv_frame(&mut rx).await.event, "game_state");
    assert_eq!(state.game.client_count().await, 1);
}

#[tokio::test]
async fn closed_gate_waits_for_auth() {
    let state = test_helpers::test_app_state_with_password("hunter2");
    let (mut conn, mut rx) = connection(&state);

    conn.open().await;

    assert_eq!(conn.phase(), Phase::Authenticating);
    assert_no_frame(&mut rx).await;
    assert_eq!(state.game.client_count().await, 0);
}

#[tokio::test]
async fn events_before_auth_are_refused() {
    let state = test_helpers::test_app_state_with_password("hunter2");
    let (mut conn, mut rx) = connection(&state);
    conn.open().await;

    let phase = conn.process_inbound_text(r#"{"event":"roll_dice"}"#).await;

    assert_eq!(phase, Phase::Authenticating);
    let err = recv_frame(&mut rx).await;
    assert_eq!(err.event, EVENT_ERROR);
    assert_eq!(err.data.get("code"), Some(&json!("E_AUTH_REQUIRED")));
    assert_eq!(state.game.store().await.state().move_count, 0);
}

#[tokio::test]
async fn correct_password_joins_channel() {
    let state = test_helpers::test_app_state_with_password("hunter2");
    let (mut conn, mut rx) = connection(&state);
    conn.open().await;

    let phase = conn
        .process_inbound_text(r#"{"event":"auth","data":{"password":"hunter2"}}"#)
        .await;

    assert_eq!(phase, Phase::Active);
    let result = recv_frame(&mut rx).await;
    assert_eq!(result.event, "auth_result");
    assert_eq!(result.data.get("success"), Some(&json!(true)));
    assert!(result.parent_id.is_some());
    assert_eq!(recv_frame(&mut rx).await.event, "game_state");
    assert_eq!(state.game.client_count().await, 1);
}

#[tokio::test]
async fn wrong_password_disconnects() {
    let state = test_helpers::test_app_state_with_password("hunter2");
    let (mut conn, mut rx) = connection(&state);
    conn.open().await;

    let phase = conn
        .process_inbound_text(r#"{"event":"auth","data":{"password":"guess"}}"#)
        .await;

    assert_eq!(phase, Phase::Disconnected);
    let result = recv_frame(&mut rx).await;
    assert_eq!(result.event, "auth_result");
    assert_eq!(result.data.get("success"), Some(&json!(false)));
    let bye = recv_frame(&mut rx).await;
    assert_eq!(bye.event, EVENT_DISCONNECT);
    assert_eq!(bye.data.get("reason"), Some(&json!("incorrect password")));
    assert_eq!(state.game.client_count().await, 0);
}

#[tokio::test]
async fn auth_without_password_field_is_malformed() {
    let state = test_helpers::test_app_state_with_password("hunter2");
    let (mut conn, mut rx) = connection(&state);
    conn.open().await;

    let phase = conn.process_inbound_text(r#"{"event":"auth","data":{}}"#).await;

    assert_eq!(phase, Phase::Authenticating);
    let err = recv_frame(&mut rx).await;
    assert_eq!(err.data.get("code"), Some(&json!("E_MALFORMED_PAYLOAD")));
}

#[tokio::test]
async fn repeated_auth_when_active_is_acknowledged() {
    let state = test_helpers::test_app_state();
    let (mut conn, mut rx) = connection(&state);
    conn.open().await;
    let _snapshot = recv_frame(&mut rx).await;

    conn.process_inbound_text(r#"{"event":"auth","data":{"password":"anything"}}"#).await;

    let result = recv_frame(&mut rx).await;
    assert_eq!(result.data.get("success"), Some(&json!(true)));
    assert_eq!(state.game.client_count().await, 1);
}

#[tokio::test]
async fn invalid_json_yields_error_and_keeps_connection() {
    let state = test_helpers::test_app_state();
    let (mut conn, mut rx) = connection(&state);
    conn.open().await;
    let _snapshot = recv_frame(&mut rx).await;

    let phase = conn.process_inbound_text("{not json").await;

    assert_eq!(phase, Phase::Active);
    let err = recv_frame(&mut rx).await;
    assert_eq!(err.event, EVENT_ERROR);
    assert!(err.parent_id.is_none());
    assert_eq!(err.data.get("code"), Some(&json!("E_MALFORMED_PAYLOAD")));

    conn.process_inbound_text(r#"{"event":"roll_dice"}"#).await;
    assert_eq!(recv_frame(&mut rx).await.event, "dice_rolled");
}

#[tokio::test]
async fn close_parts_channel() {
    let state = test_helpers::test_app_state();
    let (mut conn, _rx) = connection(&state);
    conn.open().await;
    assert_eq!(state.game.client_count().await, 1);

    conn.close().await;
    conn.close().await;

    assert_eq!(conn.phase(), Phase::Disconnected);
    assert_eq!(state.game.client_count().await, 0);
}

#[test]
fn origin_check_respects_config() {
    let mut config = ServerConfig { allowed_origin: "https://amdavad.example".into(), ..ServerConfig::default() };
    let mut headers = HeaderMap::new();
    assert!(origin_allowed(&config, &headers));

    headers.insert(ORIGIN, "https://amdavad.example/".parse().expect("header"));
    assert!(origin_allowed(&config, &headers));

    headers.insert(ORIGIN, "https://evil.example".parse().expect("header"));
    assert!(!origin_allowed(&config, &headers));

    config.allowed_origin = "*".into();
    assert!(origin_allowed(&config, &headers));
}

// =============================================================================
// END TO END
// =============================================================================

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(state: AppState) -> std::net::SocketAddr {
    let (addr, _server) = serve_until(state, std::future::pending()).await;
    addr
}

async fn serve_until<F>(state: AppState, signal: F) -> (std::net::SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(crate::routes::serve(listener, state, signal));
    (addr, server)
}

async fn connect(addr: std::net::SocketAddr, path: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("connect");
    ws
}

async fn send(ws: &mut Client, text: &str) {
    ws.send(tungstenite::Message::Text(text.into())).await.expect("send");
}

/// Next raw message, skipping pings and pongs.
async fn next_message(ws: &mut Client) -> Option<tungstenite::Message> {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next()).await.expect("receive timed out")?;
        match msg.ok()? {
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => {}
            other => return Some(other),
        }
    }
}

/// Next text frame, skipping pings.
async fn next_frame(ws: &mut Client) -> Option<Frame> {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next()).await.expect("receive timed out")?;
        match msg.ok()? {
            tungstenite::Message::Text(text) => {
                return Some(serde_json::from_str(text.as_str()).expect("frame json"));
            }
            tungstenite::Message::Close(_) => return None,
            _ => {}
        }
    }
}

#[tokio::test]
async fn two_clients_see_each_others_rolls() {
    let addr = serve(test_helpers::test_app_state()).await;
    let mut alice = connect(addr, "/ws").await;
    let mut bob = connect(addr, "/ws").await;

    assert_eq!(next_frame(&mut alice).await.expect("snapshot").event, "game_state");
    assert_eq!(next_frame(&mut bob).await.expect("snapshot").event, "game_state");

    send(&mut alice, r#"{"event":"roll_dice"}"#).await;

    let own = next_frame(&mut alice).await.expect("own roll");
    let peer = next_frame(&mut bob).await.expect("peer roll");
    assert_eq!(own.event, "dice_rolled");
    assert_eq!(peer.event, "dice_rolled");
    assert_eq!(own.data.get("dice"), peer.data.get("dice"));
    assert_eq!(peer.data.get("move_count"), Some(&json!(1)));
}

#[tokio::test]
async fn wrong_password_closes_socket() {
    let addr = serve(test_helpers::test_app_state_with_password("hunter2")).await;
    let mut ws = connect(addr, "/ws").await;

    send(&mut ws, r#"{"event":"auth","data":{"password":"nope"}}"#).await;

    let result = next_frame(&mut ws).await.expect("auth_result");
    assert_eq!(result.data.get("success"), Some(&json!(false)));
    assert_eq!(next_frame(&mut ws).await.expect("disconnect").event, EVENT_DISCONNECT);
    assert!(next_frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn sync_endpoint_skips_password() {
    let addr = serve(test_helpers::test_app_state_with_password("hunter2")).await;
    let mut ws = connect(addr, "/sync").await;

    let snapshot = next_frame(&mut ws).await.expect("snapshot");
    assert_eq!(snapshot.event, "state");

    send(&mut ws, r#"{"event":"update","data":{"message":"hi"}}"#).await;
    let update = next_frame(&mut ws).await.expect("update");
    assert_eq!(update.data.get("message"), Some(&json!("hi")));
}

#[tokio::test]
async fn healthz_is_ok() {
    let addr = serve(test_helpers::test_app_state()).await;
    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    tokio::io::AsyncWriteExt::write_all(&mut stream, b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write");
    let mut buf = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut buf).await.expect("read");
    let response = String::from_utf8_lossy(&buf);
    assert!(response.starts_with("HTTP/1.1 200"));
}

#[tokio::test]
async fn mismatched_origin_upgrade_is_forbidden() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let config = ServerConfig { allowed_origin: "https://amdavad.example".into(), ..ServerConfig::default() };
    let addr = serve(AppState::new(config)).await;

    let mut request = format!("ws://{addr}/ws").into_client_request().expect("request");
    request.headers_mut().insert(ORIGIN, "https://evil.example".parse().expect("header"));
    match tokio_tungstenite::connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade with foreign origin should be refused"),
    }

    let mut request = format!("ws://{addr}/sync").into_client_request().expect("request");
    request.headers_mut().insert(ORIGIN, "https://amdavad.example".parse().expect("header"));
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.expect("matching origin connects");
    assert_eq!(next_frame(&mut ws).await.expect("snapshot").event, "state");
}

#[tokio::test]
async fn shutdown_sends_disconnect_then_close_to_every_socket() {
    let state = test_helpers::test_app_state_with_password("hunter2");
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, server) = serve_until(state.clone(), async move {
        let _ = stop_rx.await;
    })
    .await;

    let mut player = connect(addr, "/ws").await;
    send(&mut player, r#"{"event":"auth","data":{"password":"hunter2"}}"#).await;
    assert_eq!(next_frame(&mut player).await.expect("auth_result").event, "auth_result");
    assert_eq!(next_frame(&mut player).await.expect("snapshot").event, "game_state");

    // Still authenticating, so not registered on any channel.
    let mut lurker = connect(addr, "/ws").await;
    let mut watcher = connect(addr, "/sync").await;
    assert_eq!(next_frame(&mut watcher).await.expect("snapshot").event, "state");

    stop_tx.send(()).expect("signal server");

    for ws in [&mut player, &mut lurker, &mut watcher] {
        let bye = next_frame(ws).await.expect("disconnect");
        assert_eq!(bye.event, EVENT_DISCONNECT);
        assert_eq!(bye.data.get("reason"), Some(&json!(SHUTDOWN_REASON)));
        assert!(matches!(next_message(ws).await, Some(tungstenite::Message::Close(_))));
    }

    timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops")
        .expect("server task")
        .expect("serve");
    assert_eq!(state.game.client_count().await, 0);
    assert_eq!(state.sync.client_count().await, 0);
}
