// Transport abstraction
// Decision: A transport is a pair of frame sink/stream so the driver does not care
// whether frames travel over a real socket or an in-memory channel

use std::pin::Pin;

use async_trait::async_trait;
use docflow_feed_core::CloseInfo;
use futures::{Sink, Stream};

use crate::error::TransportError;

/// Unit of traffic on a feed transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close(Option<CloseInfo>),
}

/// Outbound half of a transport
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a transport
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Dials feed transports
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`; resolves once the handshake completed
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}
