// Feed driver
//
// Single task that feeds control requests, transport reports and timer
// firings into the FeedMachine and performs the actions it returns.
// - the retry timer is one optional sleep; re-arming replaces it
// - the ping interval runs for the life of the client and is a no-op while
//   no transport is open
// - state changes are published on a watch channel, new events on a broadcast

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use docflow_feed_core::{Action, CloseInfo, ConnectionId, ConnectionState, Event, FeedMachine};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, warn};

use crate::connection::{ConnectionHandle, TransportReport};
use crate::transport::Connector;

/// Requests from `FeedClient` to the driver
#[derive(Debug)]
pub(crate) enum Control {
    Connect,
    Reconnect,
    Ping,
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct Driver {
    machine: Arc<Mutex<FeedMachine>>,
    connector: Arc<dyn Connector>,
    control: mpsc::UnboundedReceiver<Control>,
    reports_tx: mpsc::UnboundedSender<TransportReport>,
    reports: mpsc::UnboundedReceiver<TransportReport>,
    connection: Option<ConnectionHandle>,
    retry: Option<Pin<Box<Sleep>>>,
    ping: Option<Interval>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<Event>,
}

impl Driver {
    pub(crate) fn new(
        machine: Arc<Mutex<FeedMachine>>,
        connector: Arc<dyn Connector>,
        control: mpsc::UnboundedReceiver<Control>,
        state: watch::Sender<ConnectionState>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        // Interval panics on a zero period
        let period = machine
            .lock()
            .config()
            .ping_interval
            .max(Duration::from_millis(1));
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (reports_tx, reports) = mpsc::unbounded_channel();

        Self {
            machine,
            connector,
            control,
            reports_tx,
            reports,
            connection: None,
            retry: None,
            ping: Some(ping),
            state,
            events,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                control = self.control.recv() => match control {
                    Some(Control::Connect) => self.step(|m| m.connect()),
                    Some(Control::Reconnect) => self.step(|m| m.reconnect()),
                    Some(Control::Ping) => {
                        let buffered = self.buffered(None);
                        self.step(|m| m.send_ping(buffered));
                    }
                    Some(Control::Shutdown(done)) => {
                        self.step(|m| m.teardown());
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        debug!("Feed client dropped, tearing down");
                        self.step(|m| m.teardown());
                        break;
                    }
                },
                Some(report) = self.reports.recv() => self.on_report(report),
                _ = fire(&mut self.retry) => {
                    self.retry = None;
                    self.step(|m| m.on_retry_timer());
                }
                _ = tick(&mut self.ping) => {
                    let buffered = self.buffered(None);
                    self.step(|m| m.send_ping(buffered));
                }
            }
        }
    }

    fn on_report(&mut self, report: TransportReport) {
        match report {
            TransportReport::Opened { id } => {
                let buffered = self.buffered(Some(id));
                self.step(|m| m.on_opened(id, buffered));
            }
            TransportReport::Message { id, text } => self.step(|m| m.on_message(id, &text)),
            TransportReport::Closed { id, reason } => {
                if self.connection.as_ref().is_some_and(|c| c.id() == id) {
                    self.connection = None;
                }
                self.step(|m| m.on_closed(id, reason));
            }
        }
    }

    /// Queued outbound bytes of the current transport, optionally only if it is `id`
    fn buffered(&self, id: Option<ConnectionId>) -> usize {
        self.connection
            .as_ref()
            .filter(|c| id.map_or(true, |id| c.id() == id))
            .map_or(0, ConnectionHandle::buffered)
    }

    fn step(&mut self, input: impl FnOnce(&mut FeedMachine) -> Vec<Action>) {
        let (actions, state) = {
            let mut machine = self.machine.lock();
            let actions = input(&mut machine);
            (actions, machine.state().clone())
        };

        for action in actions {
            self.apply(action);
        }

        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Open { id, url } => {
                if let Some(previous) = self.connection.take() {
                    previous.close(CloseInfo::normal("superseded"));
                }
                self.connection = Some(ConnectionHandle::spawn(
                    id,
                    url,
                    self.connector.clone(),
                    self.reports_tx.clone(),
                ));
            }
            Action::Send { id, message } => {
                let Some(connection) = self.connection.as_ref().filter(|c| c.id() == id) else {
                    debug!(connection_id = %id, "Dropping message for stale transport");
                    return;
                };
                match message.encode() {
                    Ok(text) => connection.send(text),
                    Err(e) => warn!(connection_id = %id, error = %e, "Failed to encode feed message"),
                }
            }
            Action::Close { id, info } => {
                if self.connection.as_ref().is_some_and(|c| c.id() == id) {
                    if let Some(connection) = self.connection.take() {
                        connection.close(info);
                    }
                }
            }
            Action::ScheduleReconnect { delay, attempt } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Arming feed retry timer");
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Action::CancelReconnect => self.retry = None,
            Action::StopPing => self.ping = None,
            Action::Emit(event) => {
                // No subscribers is fine; the buffer keeps the event
                let _ = self.events.send(event);
            }
        }
    }
}

async fn fire(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
