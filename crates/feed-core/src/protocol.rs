// Feed Wire Protocol
//
// JSON text frames tagged by a "type" field.
// Client -> server: auth (once per open), ping (periodic), subscribe.
// Server -> client: ready, activity, pong, heartbeat, subscribed, error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::Event;

/// WebSocket close codes used by the feed
pub mod close_code {
    /// Normal closure (manual reconnect, teardown, server-reported error)
    pub const NORMAL: u16 = 1000;
    /// Server rejected a payload it cannot parse
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Server rejected authentication
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Server-side misconfiguration
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Client closed voluntarily because its outbound buffer backed up
    pub const BACKPRESSURE: u16 = 4000;
}

/// Messages sent by feed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticates the connection and selects the tenant scope
    Auth { token: String, tenant_id: String },

    /// Liveness probe
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Channel subscription request
    Subscribe {
        #[serde(default)]
        channels: Vec<String>,
    },
}

impl ClientMessage {
    pub fn ping() -> Self {
        ClientMessage::Ping { timestamp: None }
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame sent by a client
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, CLIENT_KINDS)
    }
}

/// Event-distribution metadata reported once per connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BusConfig {
    #[serde(default)]
    pub bus_type: Option<String>,
    #[serde(default)]
    pub production_ready: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Messages pushed by the feed server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication accepted; carries the bus configuration
    Ready(BusConfig),

    /// A new tenant-scoped event
    Activity { data: Event },

    /// Reply to a ping
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Server-side idle keepalive
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Reply to a subscribe request
    Subscribed {
        #[serde(default)]
        channels: Vec<String>,
    },

    /// Server-reported failure
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default)]
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame sent by the server
    ///
    /// Distinguishes unknown message kinds from known kinds with a bad shape
    /// so callers can log them differently.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, SERVER_KINDS)
    }
}

const CLIENT_KINDS: &[&str] = &["auth", "ping", "subscribe"];
const SERVER_KINDS: &[&str] = &[
    "ready",
    "activity",
    "pong",
    "heartbeat",
    "subscribed",
    "error",
];

/// Wire decoding failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no type tag")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

fn decode_tagged<T: serde::de::DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !known.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
}
