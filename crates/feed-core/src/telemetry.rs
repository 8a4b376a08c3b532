// Telemetry Module
//
// Initialization helper for tracing shared by the feed server and the CLI.
// Configure via environment variables:
// - OTEL_SERVICE_NAME: Service name recorded on startup (default: "docflow")
// - RUST_LOG or LOG_LEVEL: Log filter (default: "info")
// - LOG_FORMAT: "json" for structured output, anything else for text

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format of the console layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for tracing
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded on startup
    pub service_name: String,
    /// Log filter (e.g., "info", "debug", "docflow_feed_client=debug")
    pub log_filter: Option<String>,
    /// Console output format
    pub format: LogFormat,
    /// Write logs to stderr instead of stdout (keeps stdout clean for CLI output)
    pub use_stderr: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "docflow".to_string(),
            log_filter: None,
            format: LogFormat::Text,
            use_stderr: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "docflow".to_string()),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            format: match std::env::var("LOG_FORMAT") {
                Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            use_stderr: false,
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        if self.log_filter.is_none() {
            self.log_filter = Some(filter.into());
        }
        self
    }

    pub fn with_stderr(mut self) -> Self {
        self.use_stderr = true;
        self
    }
}

/// Initialize the global tracing subscriber
///
/// Returns false when a subscriber was already installed (tests, embedding
/// applications); the existing one is left untouched.
///
/// # Example
///
/// ```ignore
/// use docflow_feed_core::telemetry::{init_telemetry, TelemetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     init_telemetry(TelemetryConfig::from_env().with_service_name("docflow-feed-server"));
///     // ... your application code
/// }
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> bool {
    let filter = config
        .log_filter
        .as_ref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let console_layer = match (config.format, config.use_stderr) {
        (LogFormat::Json, true) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Json, false) => tracing_subscriber::fmt::layer()
            .json()
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, true) => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, false) => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, "Telemetry initialized");
    }
    installed
}
