// Integration tests for the feed client driver
// Uses MemoryConnector with a paused clock, so reconnect and ping timing is exact

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use docflow_feed_client::{
    BusConfig, ConnectionStatus, Event, FeedClient, FeedConfig, Frame, MemoryConnector,
    MemoryListener, MemoryPeer,
};
use docflow_feed_core::machine::RETRIES_EXHAUSTED;
use docflow_feed_core::{CloseInfo, ClientMessage, ServerMessage};
use serde_json::json;
use tokio::time::Instant;

fn admin_token() -> String {
    let encode = |value: serde_json::Value| URL_SAFE_NO_PAD.encode(value.to_string());
    format!(
        "{}.{}.signature",
        encode(json!({"alg": "HS256", "typ": "JWT"})),
        encode(json!({"sub": "admin-1", "role": "admin"}))
    )
}

fn config() -> FeedConfig {
    FeedConfig::new("ws://feed.test")
        .with_token(admin_token())
        .with_tenant_id("acme")
}

fn start(config: FeedConfig) -> (FeedClient, MemoryListener) {
    let (connector, listener) = MemoryConnector::new();
    let client = FeedClient::start_with_connector(config, Arc::new(connector));
    (client, listener)
}

fn activity(id: &str, event_type: &str, tenant_id: &str) -> ServerMessage {
    ServerMessage::Activity {
        data: Event::new(id, event_type, tenant_id),
    }
}

/// Accept the next dial, consume the auth frame and wait until connected
async fn accept_connected(client: &FeedClient, listener: &mut MemoryListener) -> MemoryPeer {
    let dial = listener.next_dial().await.expect("Expected a dial");
    let mut peer = dial.accept();
    let auth = peer.recv().await.expect("Expected auth frame");
    assert!(matches!(auth, Frame::Text(ref t) if t.contains("\"auth\"")));
    client
        .wait_for_state(|s| s.status == ConnectionStatus::Connected)
        .await
        .expect("Client should connect");
    peer
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_connects_authenticates_and_buffers_activity() {
    let (client, mut listener) = start(config());
    let mut events = client.subscribe_events();

    let dial = listener.next_dial().await.expect("Expected a dial");
    assert!(
        dial.url()
            .starts_with("ws://feed.test/api/admin/feed?token="),
        "unexpected url {}",
        dial.url()
    );
    let mut peer = dial.accept();

    let Some(Frame::Text(auth)) = peer.recv().await else {
        panic!("Expected auth text frame");
    };
    assert_eq!(
        ClientMessage::decode(&auth).unwrap(),
        ClientMessage::Auth {
            token: admin_token(),
            tenant_id: "acme".to_string(),
        }
    );

    peer.send(&ServerMessage::Ready(BusConfig {
        bus_type: Some("memory".to_string()),
        production_ready: false,
        tenant_id: Some("acme".to_string()),
    }));
    peer.send(&activity("e1", "document_processed", "acme"));
    peer.send(&activity("e2", "admin_action", "default"));
    peer.send(&activity("e3", "document_failed", "globex"));

    for _ in 0..3 {
        events.recv().await.expect("Expected activity notification");
    }

    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(ids(&client.events()), vec!["e3", "e2", "e1"]);
    assert_eq!(ids(&client.tenant_events(Some("acme"))), vec!["e2", "e1"]);
    assert_eq!(
        ids(&client.events_by_type(&["document_failed", "document_processed"])),
        vec!["e3", "e1"]
    );
    assert_eq!(
        client.bus_config().and_then(|b| b.bus_type),
        Some("memory".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_server_backs_off_then_gives_up() {
    let (client, mut listener) = start(config());

    let mut dialed_at = Vec::new();
    for _ in 0..6 {
        let dial = listener.next_dial().await.expect("Expected a dial");
        dialed_at.push(Instant::now());
        dial.reject("connection refused");
    }

    let state = client
        .wait_for_state(|s| s.status == ConnectionStatus::Error)
        .await
        .unwrap();
    assert_eq!(state.attempts, 5);
    assert_eq!(
        state.last_error.as_deref(),
        Some("Max reconnection attempts reached: WebSocket connection error: connection refused")
    );

    let gaps: Vec<u64> = dialed_at
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![500, 1000, 2000, 4000, 8000]);

    // No sixth retry, however long we wait
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(listener.try_next_dial().is_none());
    assert_eq!(listener.dialed_urls().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_cancels_pending_retry() {
    let (client, mut listener) = start(config());

    listener.next_dial().await.unwrap().reject("connection refused");
    let state = client.wait_for_state(|s| s.attempts == 1).await.unwrap();
    assert_eq!(state.status, ConnectionStatus::Connecting);
    assert_eq!(
        state.last_error.as_deref(),
        Some("WebSocket connection error: connection refused")
    );

    let before = Instant::now();
    client.reconnect().unwrap();
    let dial = listener.next_dial().await.expect("Reconnect should dial at once");
    assert_eq!(Instant::now(), before);

    let _peer = dial.accept();
    let state = client
        .wait_for_state(|s| s.status == ConnectionStatus::Connected)
        .await
        .unwrap();
    assert_eq!(state.attempts, 0);
    assert_eq!(state.last_error, None);

    // The cancelled 500ms retry must not fire
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(listener.try_next_dial().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_exhaustion_restarts_budget() {
    let config = config().with_reconnect_policy(docflow_feed_client::ReconnectPolicy::no_retry());
    let (client, mut listener) = start(config);

    listener.next_dial().await.unwrap().reject("connection refused");
    let state = client
        .wait_for_state(|s| s.status == ConnectionStatus::Error)
        .await
        .unwrap();
    assert!(state
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with(RETRIES_EXHAUSTED)));

    client.reconnect().unwrap();
    let _peer = accept_connected(&client, &mut listener).await;
    assert_eq!(client.state().attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ping_every_interval_while_connected() {
    let (client, mut listener) = start(config());
    let start = Instant::now();
    let mut peer = accept_connected(&client, &mut listener).await;

    let frame = peer.recv().await.expect("Expected ping");
    assert_eq!(frame, Frame::Text(r#"{"type":"ping"}"#.to_string()));
    assert_eq!(start.elapsed(), Duration::from_secs(30));

    peer.send(&ServerMessage::Pong { timestamp: None });
    peer.send(&ServerMessage::Heartbeat { timestamp: None });

    let frame = peer.recv().await.expect("Expected second ping");
    assert_eq!(frame, Frame::Text(r#"{"type":"ping"}"#.to_string()));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_closes_and_retries() {
    let (client, mut listener) = start(config().with_backpressure_ceiling(64));

    // The stalled peer never reads, so the auth frame stays queued
    let _peer = listener.next_dial().await.unwrap().accept_stalled();
    client
        .wait_for_state(|s| s.status == ConnectionStatus::Connected)
        .await
        .unwrap();

    client.send_ping().unwrap();

    let state = client.wait_for_state(|s| s.attempts == 1).await.unwrap();
    assert_eq!(state.status, ConnectionStatus::Connecting);
    assert_eq!(
        state.last_error.as_deref(),
        Some("Connection closed due to backpressure")
    );
    assert_eq!(state.attempts, 1);

    let before = Instant::now();
    let _dial = listener.next_dial().await.expect("Backpressure close should retry");
    assert_eq!(before.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_missing_token_never_dials() {
    let config = FeedConfig::new("ws://feed.test").with_tenant_id("acme");
    let (client, mut listener) = start(config);

    let state = client
        .wait_for_state(|s| s.status == ConnectionStatus::Error)
        .await
        .unwrap();
    assert_eq!(state.last_error.as_deref(), Some("No admin token provided"));
    assert_eq!(state.attempts, 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(listener.try_next_dial().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_token_without_role_never_dials() {
    let encode = |value: serde_json::Value| URL_SAFE_NO_PAD.encode(value.to_string());
    let token = format!(
        "{}.{}.sig",
        encode(json!({"alg": "HS256"})),
        encode(json!({"sub": "viewer"}))
    );
    let (client, mut listener) = start(config().with_token(token));

    let state = client
        .wait_for_state(|s| s.status == ConnectionStatus::Error)
        .await
        .unwrap();
    assert_eq!(
        state.last_error.as_deref(),
        Some("Token validation failed: Invalid admin token format")
    );
    assert!(listener.try_next_dial().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_keeps_buffer_until_next_connection() {
    let (client, mut listener) = start(config());
    let mut events = client.subscribe_events();
    let peer = accept_connected(&client, &mut listener).await;

    peer.send(&activity("e1", "ocr_completed", "acme"));
    events.recv().await.unwrap();
    peer.close(Some(CloseInfo::new(1011, "bus failure")));

    let state = client.wait_for_state(|s| s.attempts == 1).await.unwrap();
    assert_eq!(state.status, ConnectionStatus::Connecting);
    assert_eq!(
        state.last_error.as_deref(),
        Some("Connection closed by server (1011): bus failure")
    );
    assert_eq!(ids(&client.events()), vec!["e1"]);

    let _peer = accept_connected(&client, &mut listener).await;
    assert!(client.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_server_error_closes_and_retries() {
    let (client, mut listener) = start(config());
    let mut peer = accept_connected(&client, &mut listener).await;

    peer.send(&ServerMessage::error("TENANT_MISMATCH", "Tenant access denied"));

    let frame = peer.recv().await.expect("Expected close frame");
    assert_eq!(frame, Frame::Close(Some(CloseInfo::normal("server error"))));

    let state = client.wait_for_state(|s| s.attempts == 1).await.unwrap();
    assert_eq!(state.status, ConnectionStatus::Connecting);
    assert_eq!(
        state.last_error.as_deref(),
        Some("server error (TENANT_MISMATCH): Tenant access denied")
    );
    assert_eq!(state.attempts, 1);
    assert!(listener.next_dial().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_clear_events_keeps_connection() {
    let (client, mut listener) = start(config());
    let mut events = client.subscribe_events();
    let peer = accept_connected(&client, &mut listener).await;

    peer.send(&activity("e1", "user_login", "acme"));
    peer.send(&activity("e2", "user_login", "acme"));
    events.recv().await.unwrap();
    events.recv().await.unwrap();

    client.clear_events();
    assert!(client.events().is_empty());
    assert_eq!(client.status(), ConnectionStatus::Connected);

    peer.send(&activity("e3", "user_login", "acme"));
    events.recv().await.unwrap();
    assert_eq!(ids(&client.events()), vec!["e3"]);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_messages_are_ignored() {
    let (client, mut listener) = start(config());
    let mut events = client.subscribe_events();
    let peer = accept_connected(&client, &mut listener).await;

    peer.send_text("not json");
    peer.send_text(r#"{"type":"mystery","data":{}}"#);
    peer.send_text(r#"{"type":"activity","data":{"id":"broken"}}"#);
    peer.send(&activity("e1", "user_login", "acme"));

    let event = events.recv().await.unwrap();
    assert_eq!(event.id, "e1");
    assert_eq!(ids(&client.events()), vec!["e1"]);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_transport_and_stops_timers() {
    let (client, mut listener) = start(config());
    let mut peer = accept_connected(&client, &mut listener).await;
    let states = client.subscribe_state();

    client.shutdown().await.unwrap();
    assert_eq!(states.borrow().status, ConnectionStatus::Disconnected);

    let frame = peer.recv().await.expect("Expected close frame");
    assert_eq!(frame, Frame::Close(Some(CloseInfo::normal("client shutdown"))));
    assert_eq!(peer.recv().await, None);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(listener.try_next_dial().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_drop_tears_down_while_retry_pending() {
    let (client, mut listener) = start(config());

    listener.next_dial().await.unwrap().reject("connection refused");
    client.wait_for_state(|s| s.attempts == 1).await.unwrap();

    drop(client);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(listener.try_next_dial().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_dialing() {
    let (client, mut listener) = start(config());
    let dial = listener.next_dial().await.unwrap();

    client.shutdown().await.unwrap();

    // Answering the abandoned dial afterwards is harmless
    dial.reject("late");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(listener.try_next_dial().is_none());
}
