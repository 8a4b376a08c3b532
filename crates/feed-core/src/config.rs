// Feed client configuration loaded from environment variables.
// Decision: Every input is optional; missing values fall back to local-dev defaults
// Decision: A missing token is not a config error here - connect() reports it via status

use std::time::Duration;

use crate::backoff::ReconnectPolicy;
use crate::buffer::DEFAULT_CAPACITY;
use crate::endpoint::DEFAULT_ENDPOINT;
use crate::event::WILDCARD_TENANT;

/// Outbound bytes queued before the connection is considered backed up (1 MiB)
pub const DEFAULT_BACKPRESSURE_CEILING: usize = 1024 * 1024;

/// Interval between liveness probes
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Feed client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Base address of the feed server (ws://, wss://, http:// or https://)
    pub endpoint: String,
    /// Bearer credential sent as query parameter and in the auth message
    pub token: Option<String>,
    /// Tenant scope requested at authentication
    pub tenant_id: Option<String>,
    /// Automatic reconnection schedule
    pub reconnect: ReconnectPolicy,
    /// Interval between liveness probes
    pub ping_interval: Duration,
    /// Number of events retained in the buffer
    pub buffer_capacity: usize,
    /// Outbound byte ceiling before the connection is closed
    pub backpressure_ceiling: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            tenant_id: None,
            reconnect: ReconnectPolicy::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
            buffer_capacity: DEFAULT_CAPACITY,
            backpressure_ceiling: DEFAULT_BACKPRESSURE_CEILING,
        }
    }
}

impl FeedConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// - `DOCFLOW_WS_URL`: feed base address (default: "ws://localhost:8000")
    /// - `DOCFLOW_ADMIN_TOKEN`: bearer credential
    /// - `DOCFLOW_TENANT_ID`: tenant scope (default: wildcard tenant)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            endpoint: non_empty("DOCFLOW_WS_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            token: non_empty("DOCFLOW_ADMIN_TOKEN"),
            tenant_id: non_empty("DOCFLOW_TENANT_ID"),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn with_backpressure_ceiling(mut self, bytes: usize) -> Self {
        self.backpressure_ceiling = bytes;
        self
    }

    /// Tenant sent in the auth message
    pub fn tenant(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or(WILDCARD_TENANT)
    }
}
