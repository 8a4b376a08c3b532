// Tenant activity feed (WebSocket)
//
// Connection lifecycle:
// 1. Upgrade is accepted unconditionally
// 2. The first text message must be `auth` and arrive within the auth timeout;
//    any failure sends an `error` message and closes (1008, or 1003 for an
//    unreadable message)
// 3. `ready` carries the bus configuration and the resolved tenant
// 4. Activities of the tenant and of the wildcard tenant are pushed as they
//    are published; pings are answered; idle connections get heartbeats

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use docflow_feed_core::protocol::close_code;
use docflow_feed_core::{BusConfig, ClientMessage, ProtocolError, ServerMessage, WILDCARD_TENANT};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::{unix_seconds, AppState};
use crate::auth::AuthError;
use crate::bus::BUS_TYPE;

/// Query parameters of the feed upgrade request
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Used when the auth message carries an empty token
    pub token: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route(docflow_feed_core::endpoint::FEED_PATH, get(feed))
}

/// GET /api/admin/feed - WebSocket upgrade
pub async fn feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

/// Why a connection was refused during authentication
#[derive(Debug)]
struct Rejection {
    code: &'static str,
    message: String,
    close: u16,
}

impl Rejection {
    fn new(code: &'static str, message: impl Into<String>, close: u16) -> Self {
        Self {
            code,
            message: message.into(),
            close,
        }
    }

    fn policy(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, message, close_code::POLICY_VIOLATION)
    }
}

impl From<AuthError> for Rejection {
    fn from(e: AuthError) -> Self {
        let close = match e {
            AuthError::Signing(_) => close_code::INTERNAL_ERROR,
            _ => close_code::POLICY_VIOLATION,
        };
        Rejection::new(e.code(), e.to_string(), close)
    }
}

/// Authenticated connection
#[derive(Debug)]
struct Session {
    tenant_id: String,
    sub: String,
}

async fn handle_socket(mut socket: WebSocket, state: AppState, query_token: Option<String>) {
    let session = match authenticate(&mut socket, &state, query_token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::debug!("Feed client left before authenticating");
            return;
        }
        Err(rejection) => {
            tracing::warn!(code = rejection.code, message = %rejection.message, "Feed authentication failed");
            reject(socket, rejection).await;
            return;
        }
    };

    tracing::info!(tenant_id = %session.tenant_id, sub = %session.sub, "Feed connection authenticated");
    run_session(socket, &state, &session).await;
    tracing::info!(tenant_id = %session.tenant_id, "Feed connection closed");
}

/// Wait for the auth message; `Ok(None)` when the client went away first
async fn authenticate(
    socket: &mut WebSocket,
    state: &AppState,
    query_token: Option<String>,
) -> Result<Option<Session>, Rejection> {
    let timeout = state.config.auth_timeout;
    let text = match tokio::time::timeout(timeout, next_text(socket)).await {
        Err(_) => {
            return Err(Rejection::policy(
                "AUTH_TIMEOUT",
                format!("Authentication timeout ({}s)", timeout.as_secs()),
            ))
        }
        Ok(None) => return Ok(None),
        Ok(Some(text)) => text,
    };

    let message = match ClientMessage::decode(&text) {
        Ok(message) => message,
        Err(ProtocolError::UnknownType(_)) => {
            return Err(Rejection::policy(
                "INVALID_AUTH",
                "First message must be authentication",
            ))
        }
        Err(e) => {
            return Err(Rejection::new(
                "BAD_AUTH_FORMAT",
                format!("Invalid authentication message: {}", e),
                close_code::UNSUPPORTED_DATA,
            ))
        }
    };

    let ClientMessage::Auth { token, tenant_id } = message else {
        return Err(Rejection::policy(
            "INVALID_AUTH",
            "First message must be authentication",
        ));
    };

    let token = if token.trim().is_empty() {
        query_token.unwrap_or_default()
    } else {
        token
    };
    let claims = state.tokens.validate(&token)?;

    let tenant_id = Some(tenant_id)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| claims.tenant_id.clone().filter(|t| !t.is_empty()))
        .unwrap_or_else(|| WILDCARD_TENANT.to_string());

    Ok(Some(Session {
        tenant_id,
        sub: claims.sub,
    }))
}

async fn reject(mut socket: WebSocket, rejection: Rejection) {
    let error = ServerMessage::error(rejection.code, rejection.message);
    if let Ok(text) = error.encode() {
        let _ = socket.send(Message::Text(text)).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: rejection.close,
            reason: Cow::Borrowed(rejection.code),
        })))
        .await;
}

/// Next text message; `None` when the socket closed
async fn next_text(socket: &mut WebSocket) -> Option<String> {
    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Binary(bytes)) => {
                if let Ok(text) = String::from_utf8(bytes) {
                    return Some(text);
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) | Err(_) => return None,
        }
    }
    None
}

async fn run_session(socket: WebSocket, state: &AppState, session: &Session) {
    let (mut sink, mut stream) = socket.split();
    let mut activity = state.bus.subscribe();

    let ready = ServerMessage::Ready(BusConfig {
        bus_type: Some(BUS_TYPE.to_string()),
        production_ready: false,
        tenant_id: Some(session.tenant_id.clone()),
    });
    if send(&mut sink, &ready).await.is_err() {
        return;
    }

    let idle = state.config.heartbeat_interval;
    let heartbeat = tokio::time::sleep(idle);
    tokio::pin!(heartbeat);

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                heartbeat.as_mut().reset(Instant::now() + idle);

                if let Some(reply) = reply_to(&text, session) {
                    if send(&mut sink, &reply).await.is_err() {
                        break;
                    }
                }
            }
            event = activity.recv() => match event {
                Ok(event) if event.visible_to(&session.tenant_id) => {
                    if send(&mut sink, &ServerMessage::Activity { data: event }).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(tenant_id = %session.tenant_id, skipped, "Feed connection lagging, activities dropped");
                }
                Err(RecvError::Closed) => break,
            },
            () = &mut heartbeat => {
                let beat = ServerMessage::Heartbeat { timestamp: Some(unix_seconds()) };
                if send(&mut sink, &beat).await.is_err() {
                    break;
                }
                heartbeat.as_mut().reset(Instant::now() + idle);
            }
        }
    }
}

/// Reply to a client message after authentication, if it warrants one
fn reply_to(text: &str, session: &Session) -> Option<ServerMessage> {
    match ClientMessage::decode(text) {
        Ok(ClientMessage::Ping { timestamp }) => Some(ServerMessage::Pong {
            timestamp: Some(timestamp.unwrap_or_else(unix_seconds)),
        }),
        Ok(ClientMessage::Subscribe { channels }) => Some(ServerMessage::Subscribed { channels }),
        Ok(ClientMessage::Auth { .. }) => {
            tracing::debug!(tenant_id = %session.tenant_id, "Ignoring repeated auth message");
            None
        }
        Err(e) => {
            tracing::debug!(tenant_id = %session.tenant_id, error = %e, "Ignoring unreadable client message");
            None
        }
    }
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match message.encode() {
        Ok(text) => sink.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode feed message");
            Ok(())
        }
    }
}
