// Error types for the feed client

use thiserror::Error;

/// Failures of a single transport
///
/// These never reach the consumer directly; the driver reports them to the
/// state machine, which turns them into reconnect attempts and diagnostics.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(msg: impl Into<String>) -> Self {
        TransportError::Other(msg.into())
    }
}

/// Errors returned by `FeedClient` control operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// The driver task is gone (client shut down or runtime stopped)
    #[error("feed client has shut down")]
    ShutDown,
}
