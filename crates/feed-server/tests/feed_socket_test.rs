// Integration tests for the feed WebSocket endpoint
// Binds the server to an ephemeral port and talks to it with a plain WebSocket client

use std::time::Duration;

use docflow_feed_core::Event;
use docflow_feed_server::{serve, AppState, ServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn config() -> ServerConfig {
    ServerConfig::default().with_jwt_secret("feed-test-secret")
}

async fn spawn_server(config: ServerConfig) -> (String, AppState) {
    let state = AppState::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state.clone()));
    (format!("ws://{}/api/admin/feed", addr), state)
}

fn admin_token(state: &AppState, role: &str, tenant: Option<&str>) -> String {
    state
        .tokens
        .mint("admin-1", role, tenant, Duration::from_secs(300))
        .unwrap()
}

async fn open(url: &str) -> Socket {
    let (socket, _) = connect_async(url).await.expect("Failed to connect");
    socket
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send");
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        match socket.next().await.expect("Socket ended").expect("Socket error") {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(frame) => panic!("Unexpected close: {:?}", frame),
            _ => continue,
        }
    }
}

async fn close_code(socket: &mut Socket) -> Option<u16> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => continue,
            _ => return None,
        }
    }
}

async fn authenticated(url: &str, token: &str, tenant: &str) -> (Socket, Value) {
    let mut socket = open(url).await;
    send_json(
        &mut socket,
        json!({"type": "auth", "token": token, "tenant_id": tenant}),
    )
    .await;
    let ready = next_json(&mut socket).await;
    (socket, ready)
}

#[tokio::test]
async fn test_ready_then_tenant_scoped_activity() {
    let (url, state) = spawn_server(config()).await;
    let token = admin_token(&state, "admin", None);

    let (mut socket, ready) = authenticated(&url, &token, "acme").await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["bus_type"], "memory");
    assert_eq!(ready["production_ready"], false);
    assert_eq!(ready["tenant_id"], "acme");

    // Subscription happens before ready is sent
    assert_eq!(state.bus.subscriber_count(), 1);
    state.bus.publish(Event::new("a1", "document_processed", "acme"));
    state.bus.publish(Event::new("g1", "document_processed", "globex"));
    state.bus.publish(Event::new("d1", "admin_action", "default"));

    let first = next_json(&mut socket).await;
    assert_eq!(first["type"], "activity");
    assert_eq!(first["data"]["id"], "a1");
    assert_eq!(first["data"]["tenant_id"], "acme");

    let second = next_json(&mut socket).await;
    assert_eq!(second["data"]["id"], "d1");

    // The globex event was skipped: the next frame is the pong
    send_json(&mut socket, json!({"type": "ping", "timestamp": 1234.5})).await;
    let pong = next_json(&mut socket).await;
    assert_eq!(pong, json!({"type": "pong", "timestamp": 1234.5}));
}

#[tokio::test]
async fn test_subscribe_is_acknowledged() {
    let (url, state) = spawn_server(config()).await;
    let token = admin_token(&state, "admin", None);
    let (mut socket, _) = authenticated(&url, &token, "acme").await;

    send_json(&mut socket, json!({"type": "subscribe", "channels": ["documents"]})).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply, json!({"type": "subscribed", "channels": ["documents"]}));
}

#[tokio::test]
async fn test_tenant_falls_back_to_token_claim_then_default() {
    let (url, state) = spawn_server(config()).await;

    let scoped = admin_token(&state, "admin", Some("initech"));
    let (_socket, ready) = authenticated(&url, &scoped, "").await;
    assert_eq!(ready["tenant_id"], "initech");

    let unscoped = admin_token(&state, "admin", None);
    let (_socket, ready) = authenticated(&url, &unscoped, "").await;
    assert_eq!(ready["tenant_id"], "default");
}

#[tokio::test]
async fn test_first_message_must_be_auth() {
    let (url, _state) = spawn_server(config()).await;
    let mut socket = open(&url).await;

    send_json(&mut socket, json!({"type": "ping"})).await;
    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "INVALID_AUTH");
    assert_eq!(close_code(&mut socket).await, Some(1008));
}

#[tokio::test]
async fn test_unreadable_auth_closes_with_unsupported_data() {
    let (url, _state) = spawn_server(config()).await;
    let mut socket = open(&url).await;

    socket
        .send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();
    let error = next_json(&mut socket).await;
    assert_eq!(error["code"], "BAD_AUTH_FORMAT");
    assert_eq!(close_code(&mut socket).await, Some(1003));
}

#[tokio::test]
async fn test_invalid_and_unprivileged_tokens_are_refused() {
    let (url, state) = spawn_server(config()).await;

    let mut socket = open(&url).await;
    send_json(
        &mut socket,
        json!({"type": "auth", "token": "aaa.bbb.ccc", "tenant_id": "acme"}),
    )
    .await;
    let error = next_json(&mut socket).await;
    assert_eq!(error["code"], "INVALID_TOKEN");
    assert_eq!(close_code(&mut socket).await, Some(1008));

    let viewer = admin_token(&state, "viewer", None);
    let mut socket = open(&url).await;
    send_json(
        &mut socket,
        json!({"type": "auth", "token": viewer, "tenant_id": "acme"}),
    )
    .await;
    let error = next_json(&mut socket).await;
    assert_eq!(error["code"], "INSUFFICIENT_PRIVILEGES");
    assert_eq!(close_code(&mut socket).await, Some(1008));
}

#[tokio::test]
async fn test_auth_timeout() {
    let (url, _state) =
        spawn_server(config().with_auth_timeout(Duration::from_millis(200))).await;
    let mut socket = open(&url).await;

    let error = next_json(&mut socket).await;
    assert_eq!(error["code"], "AUTH_TIMEOUT");
    assert_eq!(close_code(&mut socket).await, Some(1008));
}

#[tokio::test]
async fn test_idle_connection_gets_heartbeat() {
    let (url, state) =
        spawn_server(config().with_heartbeat_interval(Duration::from_millis(200))).await;
    let token = admin_token(&state, "admin", Some("acme"));
    let (mut socket, _) = authenticated(&url, &token, "acme").await;

    let beat = next_json(&mut socket).await;
    assert_eq!(beat["type"], "heartbeat");
    assert!(beat["timestamp"].as_f64().unwrap() > 1_600_000_000.0);
}
