// Tenant Feed Core
//
// This crate holds everything about the tenant activity feed that does not
// need a socket or a clock:
// - The activity event schema shared by server and clients
// - The wire protocol (client and server message kinds)
// - Credential pre-validation done before any connection attempt
// - Reconnect backoff policy and the bounded event buffer
// - FeedMachine, the connection state machine driven by docflow-feed-client
//
// Key design decisions:
// - The state machine is sans-IO: transport callbacks and timer firings are
//   inputs, and every input returns a list of actions for the driver
// - Connection ids tag every transport so reports from superseded
//   connections are dropped instead of corrupting state
// - Failures never escape as errors; they are reflected in ConnectionState

pub mod backoff;
pub mod buffer;
pub mod config;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod machine;
pub mod protocol;
pub mod telemetry;

pub use backoff::ReconnectPolicy;
pub use buffer::EventBuffer;
pub use config::FeedConfig;
pub use credential::{Credential, CredentialError};
pub use error::{FeedError, Result};
pub use event::{Event, WILDCARD_TENANT};
pub use machine::{
    Action, CloseInfo, CloseReason, ConnectionId, ConnectionState, ConnectionStatus, FeedMachine,
};
pub use protocol::{BusConfig, ClientMessage, ProtocolError, ServerMessage};
