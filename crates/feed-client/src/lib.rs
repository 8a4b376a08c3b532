// Tenant Feed Client
//
// Runtime half of the activity feed client. A FeedClient owns one driver
// task that performs the actions of the docflow-feed-core state machine:
// dialing transports, sending auth and pings, arming the retry timer and
// publishing state and events to consumers.
//
// Transports are pluggable through the Connector trait:
// - WsConnector dials real WebSocket endpoints (tokio-tungstenite)
// - MemoryConnector hands dials to the caller, for tests and embedding

mod client;
mod connection;
mod driver;
pub mod error;
pub mod memory;
pub mod transport;
pub mod ws;

pub use client::FeedClient;
pub use error::{ClientError, TransportError};
pub use memory::{MemoryConnector, MemoryListener, MemoryPeer, PendingDial};
pub use transport::{Connector, Frame, FrameSink, FrameStream};
pub use ws::WsConnector;

// Re-export the core types consumers need alongside the client
pub use docflow_feed_core::{
    BusConfig, ConnectionState, ConnectionStatus, Event, FeedConfig, ReconnectPolicy,
};
