// Error types for the feed core

use thiserror::Error;

/// Result type alias for feed core operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors raised while building the feed URL
///
/// None of these cross the client's public boundary; the state machine turns
/// them into `ConnectionState::last_error` diagnostics.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Endpoint could not be parsed as a URL
    #[error("Invalid feed endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Endpoint uses a scheme that cannot carry a WebSocket
    #[error("Unsupported feed endpoint scheme: {0}")]
    UnsupportedScheme(String),
}
