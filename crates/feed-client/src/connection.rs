// Per-transport task
//
// Owns the sink/stream of one transport, forwards inbound frames to the
// driver and writes outbound text. Queued outbound bytes are tracked so the
// driver can measure backpressure before each ping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docflow_feed_core::{CloseInfo, CloseReason, ConnectionId};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use crate::transport::{Connector, Frame, FrameSink};

/// Time allowed for the close frame to be written before the socket is dropped
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What a transport task tells the driver
#[derive(Debug)]
pub(crate) enum TransportReport {
    Opened { id: ConnectionId },
    Message { id: ConnectionId, text: String },
    Closed { id: ConnectionId, reason: CloseReason },
}

/// Driver-side handle to a transport task
///
/// Dropping the handle closes the transport with a normal close.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
    close: Option<oneshot::Sender<CloseInfo>>,
    pending: Arc<AtomicUsize>,
    _task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub(crate) fn spawn(
        id: ConnectionId,
        url: String,
        connector: Arc<dyn Connector>,
        reports: mpsc::UnboundedSender<TransportReport>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let task = ConnectionTask {
            id,
            reports,
            outbound: outbound_rx,
            close: close_rx,
            pending: pending.clone(),
        };
        let span = tracing::debug_span!("feed_transport", connection_id = %id);
        let handle = tokio::spawn(task.run(url, connector).instrument(span));

        Self {
            id,
            outbound: outbound_tx,
            close: Some(close_tx),
            pending,
            _task: handle,
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Outbound bytes accepted but not yet written
    pub(crate) fn buffered(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn send(&self, text: String) {
        let len = text.len();
        self.pending.fetch_add(len, Ordering::SeqCst);
        if self.outbound.send(text).is_err() {
            self.pending.fetch_sub(len, Ordering::SeqCst);
            debug!(connection_id = %self.id, "Dropping message for finished transport");
        }
    }

    pub(crate) fn close(mut self, info: CloseInfo) {
        if let Some(close) = self.close.take() {
            let _ = close.send(info);
        }
    }
}

struct ConnectionTask {
    id: ConnectionId,
    reports: mpsc::UnboundedSender<TransportReport>,
    outbound: mpsc::UnboundedReceiver<String>,
    close: oneshot::Receiver<CloseInfo>,
    pending: Arc<AtomicUsize>,
}

impl ConnectionTask {
    async fn run(mut self, url: String, connector: Arc<dyn Connector>) {
        let dial = connector.connect(&url);
        tokio::pin!(dial);

        let dialed = tokio::select! {
            biased;
            close = &mut self.close => {
                debug!("Transport closed while dialing");
                self.report_closed(CloseReason::Local(close_or_dropped(close)));
                return;
            }
            result = &mut dial => result,
        };

        let (mut sink, mut stream) = match dialed {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, "Transport dial failed");
                self.report_closed(CloseReason::Failed(e.to_string()));
                return;
            }
        };

        self.report(TransportReport::Opened { id: self.id });

        loop {
            tokio::select! {
                biased;
                close = &mut self.close => {
                    let info = close_or_dropped(close);
                    close_gracefully(&mut sink, info.clone()).await;
                    self.report_closed(CloseReason::Local(info));
                    return;
                }
                text = self.outbound.recv() => {
                    let Some(text) = text else {
                        let info = CloseInfo::normal("client dropped");
                        close_gracefully(&mut sink, info.clone()).await;
                        self.report_closed(CloseReason::Local(info));
                        return;
                    };
                    let len = text.len();
                    let sent = tokio::select! {
                        biased;
                        close = &mut self.close => {
                            // Sink is stuck; give up on the pending write
                            let info = close_or_dropped(close);
                            self.report_closed(CloseReason::Local(info));
                            return;
                        }
                        sent = sink.send(Frame::Text(text)) => sent,
                    };
                    self.pending.fetch_sub(len, Ordering::SeqCst);
                    if let Err(e) = sent {
                        self.report_closed(CloseReason::Failed(e.to_string()));
                        return;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        self.report(TransportReport::Message { id: self.id, text });
                    }
                    Some(Ok(Frame::Close(info))) => {
                        debug!(close = ?info, "Peer closed transport");
                        self.report_closed(CloseReason::Remote(info));
                        return;
                    }
                    Some(Err(e)) => {
                        self.report_closed(CloseReason::Failed(e.to_string()));
                        return;
                    }
                    None => {
                        self.report_closed(CloseReason::Remote(None));
                        return;
                    }
                },
            }
        }
    }

    fn report(&self, report: TransportReport) {
        // Driver gone means the client was dropped; nothing left to notify
        let _ = self.reports.send(report);
    }

    fn report_closed(&self, reason: CloseReason) {
        self.report(TransportReport::Closed {
            id: self.id,
            reason,
        });
    }
}

fn close_or_dropped(close: Result<CloseInfo, oneshot::error::RecvError>) -> CloseInfo {
    close.unwrap_or_else(|_| CloseInfo::normal("client dropped"))
}

async fn close_gracefully(sink: &mut FrameSink, info: CloseInfo) {
    let closing = async {
        sink.send(Frame::Close(Some(info))).await?;
        sink.close().await
    };
    match tokio::time::timeout(CLOSE_GRACE, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
        Err(_) => debug!("Close frame timed out"),
    }
}
