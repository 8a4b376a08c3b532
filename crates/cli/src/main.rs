// DocFlow CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: `tail` runs the same resilient feed client as embedding applications.

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use docflow_feed_core::telemetry::{init_telemetry, TelemetryConfig};
use docflow_feed_core::FeedConfig;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "DocFlow CLI - Follow and publish tenant activity")]
#[command(version)]
pub struct Cli {
    /// Admin API base URL
    #[arg(long, env = "DOCFLOW_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Feed server base URL (defaults to the API URL)
    #[arg(long, env = "DOCFLOW_WS_URL")]
    pub ws_url: Option<String>,

    /// Admin bearer token
    #[arg(long, env = "DOCFLOW_ADMIN_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Tenant scope
    #[arg(long, env = "DOCFLOW_TENANT_ID", global = true)]
    pub tenant: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"], global = true)]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the live activity feed
    Tail {
        /// Only show these event types (repeatable)
        #[arg(long = "type", short = 't')]
        types: Vec<String>,

        /// Exit after this many events
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Publish an activity
    Publish {
        /// Activity type (e.g. document_processed)
        event_type: String,

        /// Details as a JSON object
        #[arg(long)]
        details: Option<String>,
    },

    /// List recent activities of the tenant
    Activities {
        /// Number of activities (1-100)
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Mint a development admin token
    Token {
        /// Signing secret (must match the server's FEED_JWT_SECRET)
        #[arg(long, env = "FEED_JWT_SECRET", hide_env_values = true)]
        secret: String,

        /// Role claim
        #[arg(long, default_value = "admin")]
        role: String,

        /// Subject claim
        #[arg(long, default_value = "docflow-cli")]
        sub: String,

        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        ttl_secs: u64,
    },
}

impl Cli {
    fn feed_config(&self) -> FeedConfig {
        let endpoint = self.ws_url.clone().unwrap_or_else(|| self.api_url.clone());
        let mut config = FeedConfig::from_env().with_endpoint(endpoint);
        if let Some(token) = &self.token {
            config = config.with_token(token.clone());
        }
        if let Some(tenant) = &self.tenant {
            config = config.with_tenant_id(tenant.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    init_telemetry(
        TelemetryConfig::from_env()
            .with_service_name("docflow-cli")
            .with_default_filter(if cli.quiet { "error" } else { "warn" })
            .with_stderr(),
    );

    let output_format = output::OutputFormat::from_str(&cli.output);
    let api = client::Client::new(&cli.api_url, cli.token.as_deref());

    match &cli.command {
        Commands::Tail { types, limit } => {
            commands::tail::run(cli.feed_config(), output_format, cli.quiet, types, *limit).await
        }
        Commands::Publish {
            event_type,
            details,
        } => {
            commands::publish::run(
                &api,
                output_format,
                event_type,
                details.as_deref(),
                cli.tenant.as_deref(),
            )
            .await
        }
        Commands::Activities { limit } => {
            commands::activities::run(&api, output_format, *limit, cli.tenant.as_deref()).await
        }
        Commands::Token {
            secret,
            role,
            sub,
            ttl_secs,
        } => commands::token::run(
            output_format,
            secret,
            role,
            sub,
            cli.tenant.as_deref(),
            *ttl_secs,
        ),
    }
}
