// Feed Connection State Machine
//
// Sans-IO model of one tenant feed client. Transport callbacks (opened,
// message, closed) and timer firings (retry, ping) arrive as discrete
// inputs; every input returns the actions the driver has to perform.
//
// States: connecting -> connected -> disconnected -> (connecting | error)
// - a close with retry budget left moves straight on to connecting with
//   attempts > 0; disconnected is what a torn down client reports
// - error is terminal on the automatic path (credential failure or retry
//   budget exhausted); reconnect() restarts from connecting
// - attempts resets to zero exactly on the transition into connected
// - at most one transport is live; opening a new one closes the old one and
//   reports from superseded transports are ignored

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::EventBuffer;
use crate::config::FeedConfig;
use crate::credential::Credential;
use crate::endpoint;
use crate::event::Event;
use crate::protocol::{close_code, BusConfig, ClientMessage, ServerMessage};

/// Diagnostic set when the automatic retry budget is spent
pub const RETRIES_EXHAUSTED: &str = "Max reconnection attempts reached";

// ============================================================================
// State
// ============================================================================

/// Connection lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Observable connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Consecutive automatic reconnect attempts since the last successful connection
    pub attempts: u32,
    /// Latest failure diagnostic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Identifies one transport instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// WebSocket close code and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(close_code::NORMAL, reason)
    }

    pub fn backpressure() -> Self {
        Self::new(close_code::BACKPRESSURE, "backpressure")
    }
}

/// How a transport ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection, with or without a close frame
    Remote(Option<CloseInfo>),
    /// The driver closed it on behalf of a `Close` action
    Local(CloseInfo),
    /// Dial failure or I/O error
    Failed(String),
}

// ============================================================================
// Actions
// ============================================================================

/// Work the driver must perform after an input
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Dial a new transport
    Open { id: ConnectionId, url: String },
    /// Send a message on an open transport
    Send {
        id: ConnectionId,
        message: ClientMessage,
    },
    /// Close a transport
    Close { id: ConnectionId, info: CloseInfo },
    /// Arm the retry timer; fire `on_retry_timer` after `delay`
    ScheduleReconnect { delay: Duration, attempt: u32 },
    /// Disarm the retry timer if armed
    CancelReconnect,
    /// Stop the liveness-probe interval
    StopPing,
    /// A new event entered the buffer
    Emit(Event),
}

// ============================================================================
// Machine
// ============================================================================

/// Connection state, event buffer and reconnection bookkeeping of one feed client
#[derive(Debug)]
pub struct FeedMachine {
    config: FeedConfig,
    state: ConnectionState,
    buffer: EventBuffer,
    bus_config: Option<BusConfig>,
    next_id: u64,
    /// Transport currently allocated (dialing or open)
    live: Option<ConnectionId>,
    /// Whether `live` completed its handshake
    open: bool,
    retry_pending: bool,
    torn_down: bool,
}

impl FeedMachine {
    pub fn new(config: FeedConfig) -> Self {
        let buffer = EventBuffer::with_capacity(config.buffer_capacity);
        Self {
            config,
            state: ConnectionState::default(),
            buffer,
            bus_config: None,
            next_id: 0,
            live: None,
            open: false,
            retry_pending: false,
            torn_down: false,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn bus_config(&self) -> Option<&BusConfig> {
        self.bus_config.as_ref()
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Transport that is open and may carry messages
    pub fn open_connection(&self) -> Option<ConnectionId> {
        self.live.filter(|_| self.open)
    }

    pub fn is_retry_pending(&self) -> bool {
        self.retry_pending
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// (Re)establish the transport
    ///
    /// Validates the credential first; on failure no transport is opened and
    /// the status becomes `Error`.
    pub fn connect(&mut self) -> Vec<Action> {
        if self.torn_down {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            actions.push(Action::CancelReconnect);
        }

        let credential = match Credential::parse(self.config.token.as_deref().unwrap_or("")) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Feed credential rejected, not connecting");
                actions.extend(self.supersede_live("credential rejected"));
                self.fail(0, e.to_string());
                return actions;
            }
        };

        let url = match endpoint::feed_url(&self.config.endpoint, credential.token()) {
            Ok(url) => url,
            Err(e) => {
                warn!(endpoint = %self.config.endpoint, error = %e, "Feed endpoint rejected, not connecting");
                actions.extend(self.supersede_live("endpoint rejected"));
                self.fail(0, e.to_string());
                return actions;
            }
        };

        actions.extend(self.supersede_live("reconnect"));

        let id = self.allocate_id();
        self.live = Some(id);
        self.open = false;
        self.state.status = ConnectionStatus::Connecting;

        debug!(
            connection_id = %id,
            tenant_id = %self.config.tenant(),
            role = %credential.role(),
            attempt = self.state.attempts,
            "Opening feed transport"
        );

        actions.push(Action::Open {
            id,
            url: url.to_string(),
        });
        actions
    }

    /// Manual reconnect: cancel any pending retry, reset the attempt counter
    /// and connect immediately
    pub fn reconnect(&mut self) -> Vec<Action> {
        if self.torn_down {
            return Vec::new();
        }

        info!(tenant_id = %self.config.tenant(), "Manual feed reconnect");

        self.retry_pending = false;
        self.state = ConnectionState::default();

        let mut actions = vec![Action::CancelReconnect];
        actions.extend(self.connect());
        actions
    }

    /// Liveness probe; `buffered` is the number of outbound bytes still queued
    pub fn send_ping(&mut self, buffered: usize) -> Vec<Action> {
        let Some(id) = self.open_connection() else {
            return Vec::new();
        };

        if buffered > self.config.backpressure_ceiling {
            warn!(
                connection_id = %id,
                buffered,
                ceiling = self.config.backpressure_ceiling,
                "Feed backpressure too high, closing connection"
            );
            return vec![Action::Close {
                id,
                info: CloseInfo::backpressure(),
            }];
        }

        vec![Action::Send {
            id,
            message: ClientMessage::ping(),
        }]
    }

    /// Empty the buffer without touching the connection
    pub fn clear_events(&mut self) {
        self.buffer.clear();
    }

    /// Buffered events whose type is one of `types`
    pub fn events_by_type<S: AsRef<str>>(&self, types: &[S]) -> Vec<Event> {
        self.buffer.by_type(types)
    }

    /// Buffered events of `tenant_id` plus wildcard events; everything when `None`
    pub fn tenant_events(&self, tenant_id: Option<&str>) -> Vec<Event> {
        self.buffer.for_tenant(tenant_id)
    }

    /// Tear down: stop pinging, cancel the retry timer, close the transport
    ///
    /// Safe to call any number of times and before anything was allocated.
    pub fn teardown(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::StopPing, Action::CancelReconnect];
        if let Some(id) = self.live.take() {
            actions.push(Action::Close {
                id,
                info: CloseInfo::normal("client shutdown"),
            });
        }

        if !self.torn_down {
            debug!(tenant_id = %self.config.tenant(), "Feed client torn down");
        }

        self.torn_down = true;
        self.open = false;
        self.retry_pending = false;
        if self.state.status != ConnectionStatus::Error {
            self.state.status = ConnectionStatus::Disconnected;
        }
        actions
    }

    // ------------------------------------------------------------------------
    // Transport and timer inputs
    // ------------------------------------------------------------------------

    /// The transport finished its handshake
    pub fn on_opened(&mut self, id: ConnectionId, buffered: usize) -> Vec<Action> {
        if self.torn_down || self.live != Some(id) {
            debug!(connection_id = %id, "Ignoring open of superseded transport");
            return Vec::new();
        }

        self.open = true;
        self.state = ConnectionState {
            status: ConnectionStatus::Connected,
            attempts: 0,
            last_error: None,
        };
        self.buffer.clear();
        self.bus_config = None;

        info!(connection_id = %id, tenant_id = %self.config.tenant(), "Feed connected");

        if buffered > self.config.backpressure_ceiling {
            warn!(
                connection_id = %id,
                buffered,
                "Feed backpressure too high on open, closing connection"
            );
            return vec![Action::Close {
                id,
                info: CloseInfo::backpressure(),
            }];
        }

        let token = self.config.token.clone().unwrap_or_default();
        vec![Action::Send {
            id,
            message: ClientMessage::Auth {
                token: token.trim().to_string(),
                tenant_id: self.config.tenant().to_string(),
            },
        }]
    }

    /// A text frame arrived
    pub fn on_message(&mut self, id: ConnectionId, text: &str) -> Vec<Action> {
        if self.torn_down || self.live != Some(id) {
            return Vec::new();
        }

        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Ignoring unreadable feed message");
                return Vec::new();
            }
        };

        match message {
            ServerMessage::Ready(bus) => {
                info!(
                    connection_id = %id,
                    bus_type = ?bus.bus_type,
                    production_ready = bus.production_ready,
                    tenant_id = ?bus.tenant_id,
                    "Feed ready"
                );
                self.bus_config = Some(bus);
                Vec::new()
            }
            ServerMessage::Activity { data } => {
                debug!(connection_id = %id, event_id = %data.id, event_type = %data.event_type, "Feed activity");
                self.buffer.push(data.clone());
                vec![Action::Emit(data)]
            }
            ServerMessage::Pong { .. } => {
                debug!(connection_id = %id, "Feed ping/pong successful");
                Vec::new()
            }
            ServerMessage::Heartbeat { .. } | ServerMessage::Subscribed { .. } => Vec::new(),
            ServerMessage::Error { code, message } => {
                let diagnostic = match code {
                    Some(code) => format!("server error ({}): {}", code, message),
                    None => format!("server error: {}", message),
                };
                warn!(connection_id = %id, error = %diagnostic, "Feed server reported an error");
                self.state.last_error = Some(diagnostic);
                vec![Action::Close {
                    id,
                    info: CloseInfo::normal("server error"),
                }]
            }
        }
    }

    /// The transport ended, or could not be opened at all
    pub fn on_closed(&mut self, id: ConnectionId, reason: CloseReason) -> Vec<Action> {
        if self.torn_down || self.live != Some(id) {
            debug!(connection_id = %id, "Ignoring close of superseded transport");
            return Vec::new();
        }

        self.live = None;
        self.open = false;
        self.state.status = ConnectionStatus::Disconnected;

        match &reason {
            CloseReason::Failed(e) => {
                self.state.last_error = Some(format!("WebSocket connection error: {}", e));
            }
            CloseReason::Remote(Some(info)) => {
                self.state.last_error = Some(format!(
                    "Connection closed by server ({}): {}",
                    info.code, info.reason
                ));
            }
            CloseReason::Remote(None) => {
                self.state.last_error = Some("Connection closed by server".to_string());
            }
            CloseReason::Local(info) if info.code == close_code::BACKPRESSURE => {
                self.state.last_error = Some("Connection closed due to backpressure".to_string());
            }
            CloseReason::Local(_) => {}
        }

        info!(connection_id = %id, reason = ?reason, attempts = self.state.attempts, "Feed disconnected");

        if !self.config.reconnect.has_attempts_remaining(self.state.attempts) {
            warn!(attempts = self.state.attempts, "Feed reconnect budget exhausted");
            self.state.status = ConnectionStatus::Error;
            self.state.last_error = Some(match self.state.last_error.take() {
                Some(cause) => format!("{}: {}", RETRIES_EXHAUSTED, cause),
                None => RETRIES_EXHAUSTED.to_string(),
            });
            return Vec::new();
        }

        // A scheduled retry reads as connecting; attempts tells it apart from the first dial
        let attempt = self.state.attempts + 1;
        let delay = self.config.reconnect.delay_for_attempt(attempt);
        self.state.attempts = attempt;
        self.state.status = ConnectionStatus::Connecting;
        self.retry_pending = true;

        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling feed reconnect");

        vec![Action::ScheduleReconnect { delay, attempt }]
    }

    /// The retry timer fired
    pub fn on_retry_timer(&mut self) -> Vec<Action> {
        if !self.retry_pending {
            debug!("Ignoring stale feed retry timer");
            return Vec::new();
        }
        self.retry_pending = false;
        self.connect()
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn allocate_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    /// Close the live transport so a new one can take its place
    fn supersede_live(&mut self, reason: &str) -> Vec<Action> {
        self.open = false;
        match self.live.take() {
            Some(id) => vec![Action::Close {
                id,
                info: CloseInfo::normal(reason),
            }],
            None => Vec::new(),
        }
    }

    fn fail(&mut self, attempts: u32, diagnostic: String) {
        self.state = ConnectionState {
            status: ConnectionStatus::Error,
            attempts,
            last_error: Some(diagnostic),
        };
    }
}
