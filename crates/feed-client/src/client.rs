// FeedClient: consumer-facing handle of a tenant feed subscription

use std::sync::Arc;

use docflow_feed_core::{
    BusConfig, ConnectionState, ConnectionStatus, Event, FeedConfig, FeedMachine,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::driver::{Control, Driver};
use crate::error::ClientError;
use crate::transport::Connector;
use crate::ws::WsConnector;

/// Resilient subscription to a tenant activity feed
///
/// Starting a client spawns its driver task and immediately connects.
/// Reads (`events`, `state`, ...) are served from shared state and never
/// wait on the driver; control operations are queued to it.
///
/// Dropping the client tears the subscription down: the retry timer and
/// the ping interval stop and the transport is closed.
///
/// # Example
///
/// ```ignore
/// use docflow_feed_client::FeedClient;
/// use docflow_feed_core::FeedConfig;
///
/// let client = FeedClient::start(FeedConfig::from_env());
/// let mut events = client.subscribe_events();
/// while let Ok(event) = events.recv().await {
///     println!("{} {}", event.event_type, event.tenant_id);
/// }
/// ```
pub struct FeedClient {
    machine: Arc<Mutex<FeedMachine>>,
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<Event>,
    driver: Option<JoinHandle<()>>,
}

impl FeedClient {
    /// Start a client that dials over WebSocket
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: FeedConfig) -> Self {
        Self::start_with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Start a client that dials through `connector`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        let event_capacity = config.buffer_capacity.max(1);
        let machine = Arc::new(Mutex::new(FeedMachine::new(config)));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (events_tx, _) = broadcast::channel(event_capacity);

        let driver = Driver::new(
            machine.clone(),
            connector,
            control_rx,
            state_tx,
            events_tx.clone(),
        );

        // Queued before the driver starts so it is the first input
        let _ = control_tx.send(Control::Connect);
        let driver = tokio::spawn(driver.run());

        Self {
            machine,
            control: control_tx,
            state: state_rx,
            events: events_tx,
            driver: Some(driver),
        }
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    /// Re-establish the connection without resetting the attempt counter
    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(Control::Connect)
    }

    /// Cancel any pending retry, reset attempts to zero and connect now
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.send(Control::Reconnect)
    }

    /// Send a liveness ping now, or close with 4000 if the outbound queue is
    /// over the backpressure ceiling. No-op while disconnected.
    pub fn send_ping(&self) -> Result<(), ClientError> {
        self.send(Control::Ping)
    }

    /// Stop the subscription and wait until the transport was told to close
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Control::Shutdown(done_tx))?;
        done_rx.await.map_err(|_| ClientError::ShutDown)?;
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        Ok(())
    }

    fn send(&self, control: Control) -> Result<(), ClientError> {
        self.control.send(control).map_err(|_| ClientError::ShutDown)
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Empty the buffer; the connection is untouched
    pub fn clear_events(&self) {
        self.machine.lock().clear_events();
    }

    /// Buffered events, newest first
    pub fn events(&self) -> Vec<Event> {
        self.machine.lock().buffer().to_vec()
    }

    /// Buffered events whose type is one of `types`, newest first
    pub fn events_by_type<S: AsRef<str>>(&self, types: &[S]) -> Vec<Event> {
        self.machine.lock().events_by_type(types)
    }

    /// Buffered events visible to `tenant_id` (its own plus wildcard events)
    ///
    /// `None` returns every buffered event.
    pub fn tenant_events(&self, tenant_id: Option<&str>) -> Vec<Event> {
        self.machine.lock().tenant_events(tenant_id)
    }

    /// Receive events as they enter the buffer
    ///
    /// A lagging receiver loses the oldest notifications; the buffer itself
    /// is unaffected.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.machine.lock().state().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.machine.lock().state().status
    }

    /// Bus information from the latest `ready` message of the current connection
    pub fn bus_config(&self) -> Option<BusConfig> {
        self.machine.lock().bus_config().cloned()
    }

    pub fn config(&self) -> FeedConfig {
        self.machine.lock().config().clone()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> Result<ConnectionState, ClientError>
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut state = self.state.clone();
        let found = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| ClientError::ShutDown)?;
        Ok(found.clone())
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
