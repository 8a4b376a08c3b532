// Feed server configuration loaded from environment variables.
// Decision: FEED_ prefix for every server setting
// Decision: Without FEED_JWT_SECRET a random per-process secret is generated,
// so tokens never survive a restart

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HISTORY_PER_TENANT: usize = 10_000;
pub const DEFAULT_MAX_TENANTS: usize = 1_000;

/// Feed server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// HS256 secret for admin tokens
    pub jwt_secret: String,
    /// Roles accepted as admin
    pub admin_roles: Vec<String>,
    /// Recent events kept per tenant
    pub history_per_tenant: usize,
    /// Tenants with retained history; the least recently active one is evicted beyond this
    pub max_tenants: usize,
    /// Time a feed connection has to send its auth message
    pub auth_timeout: Duration,
    /// Idle time after which the server sends a heartbeat
    pub heartbeat_interval: Duration,
    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: random_secret(),
            admin_roles: default_admin_roles(),
            history_per_tenant: DEFAULT_HISTORY_PER_TENANT,
            max_tenants: DEFAULT_MAX_TENANTS,
            auth_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let jwt_secret = get("FEED_JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("FEED_JWT_SECRET not set, using a random per-process secret");
            defaults.jwt_secret.clone()
        });

        let port = match get("FEED_PORT").map(|p| p.trim().parse::<u16>()) {
            Some(Ok(port)) => port,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Invalid FEED_PORT, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }
            None => DEFAULT_PORT,
        };

        let admin_roles = get("FEED_ADMIN_ROLES")
            .map(|roles| split_list(&roles))
            .filter(|roles| !roles.is_empty())
            .unwrap_or(defaults.admin_roles);

        let history_per_tenant = get("FEED_HISTORY_PER_TENANT")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_HISTORY_PER_TENANT);

        let max_tenants = get("FEED_MAX_TENANTS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TENANTS);

        Self {
            host: get("FEED_HOST").unwrap_or(defaults.host),
            port,
            jwt_secret,
            admin_roles,
            history_per_tenant,
            max_tenants,
            auth_timeout: defaults.auth_timeout,
            heartbeat_interval: defaults.heartbeat_interval,
            cors_origins: get("FEED_CORS_ORIGINS")
                .map(|origins| split_list(&origins))
                .unwrap_or_default(),
        }
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = secret.into();
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_history_per_tenant(mut self, limit: usize) -> Self {
        self.history_per_tenant = limit.max(1);
        self
    }

    pub fn with_max_tenants(mut self, limit: usize) -> Self {
        self.max_tenants = limit.max(1);
        self
    }

    /// Address to bind, e.g. "0.0.0.0:8000"
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_admin_roles() -> Vec<String> {
    vec!["admin".to_string(), "super_admin".to_string()]
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn random_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
