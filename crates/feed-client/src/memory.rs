// In-memory transports for tests and embedding
//
// MemoryConnector hands every dial to a MemoryListener, where the caller
// decides to accept (getting a MemoryPeer that plays the server side),
// stall, or reject it.

use std::collections::VecDeque;

use async_trait::async_trait;
use docflow_feed_core::{CloseInfo, ServerMessage};
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;
use crate::transport::{Connector, Frame, FrameSink, FrameStream};

type DialResult = Result<(FrameSink, FrameStream), TransportError>;

/// Connector whose dials are answered by a `MemoryListener`
#[derive(Debug)]
pub struct MemoryConnector {
    dials: mpsc::UnboundedSender<PendingDial>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { dials: tx },
            MemoryListener {
                dials: rx,
                log: Mutex::new(VecDeque::new()),
            },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> DialResult {
        let (respond, response) = oneshot::channel();
        self.dials
            .send(PendingDial {
                url: url.to_string(),
                respond,
            })
            .map_err(|_| TransportError::other("listener closed"))?;
        response
            .await
            .map_err(|_| TransportError::other("dial abandoned"))?
    }
}

/// Receives dial attempts made through a `MemoryConnector`
#[derive(Debug)]
pub struct MemoryListener {
    dials: mpsc::UnboundedReceiver<PendingDial>,
    log: Mutex<VecDeque<String>>,
}

impl MemoryListener {
    /// Wait for the next dial
    pub async fn next_dial(&mut self) -> Option<PendingDial> {
        let dial = self.dials.recv().await?;
        self.log.lock().push_back(dial.url.clone());
        Some(dial)
    }

    /// Next dial if one is already waiting
    pub fn try_next_dial(&mut self) -> Option<PendingDial> {
        let dial = self.dials.try_recv().ok()?;
        self.log.lock().push_back(dial.url.clone());
        Some(dial)
    }

    /// URLs of every dial taken so far
    pub fn dialed_urls(&self) -> Vec<String> {
        self.log.lock().iter().cloned().collect()
    }
}

/// One dial attempt waiting for an answer
pub struct PendingDial {
    url: String,
    respond: oneshot::Sender<DialResult>,
}

impl PendingDial {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Complete the handshake
    pub fn accept(self) -> MemoryPeer {
        let (client_tx, from_client) = fmpsc::unbounded();
        self.complete(Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)), from_client)
    }

    /// Complete the handshake with a server that never reads, so client
    /// writes queue up behind the first one
    pub fn accept_stalled(self) -> MemoryPeer {
        let (client_tx, from_client) = fmpsc::channel(0);
        self.complete(Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)), from_client)
    }

    /// Fail the handshake (connection refused)
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.respond.send(Err(TransportError::other(reason)));
    }

    fn complete<R>(self, sink: FrameSink, from_client: R) -> MemoryPeer
    where
        R: futures::Stream<Item = Frame> + Send + Unpin + 'static,
    {
        let (to_client, client_rx) = fmpsc::unbounded();
        let stream: FrameStream = Box::pin(client_rx);
        let _ = self.respond.send(Ok((sink, stream)));
        MemoryPeer {
            to_client,
            from_client: Box::pin(from_client),
        }
    }
}

/// Server side of an accepted in-memory transport
pub struct MemoryPeer {
    to_client: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: std::pin::Pin<Box<dyn futures::Stream<Item = Frame> + Send>>,
}

impl MemoryPeer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Text(text.into())));
    }

    pub fn send(&self, message: &ServerMessage) {
        if let Ok(text) = message.encode() {
            self.send_text(text);
        }
    }

    /// Close from the server side, optionally with a close frame
    pub fn close(self, info: Option<CloseInfo>) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Close(info)));
    }

    /// Break the transport with an I/O error
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self
            .to_client
            .unbounded_send(Err(TransportError::other(reason)));
    }

    /// Next frame written by the client; `None` once the client dropped the transport
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.next().await
    }
}

impl std::fmt::Debug for PendingDial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDial").field("url", &self.url).finish()
    }
}

impl std::fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeer").finish_non_exhaustive()
    }
}
