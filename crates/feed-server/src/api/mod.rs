// HTTP and WebSocket routes of the feed server

pub mod activities;
pub mod feed;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::TokenService;
use crate::bus::{ActivityBus, BUS_TYPE};
use crate::config::ServerConfig;

/// State shared by all routes
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub tokens: Arc<TokenService>,
    pub bus: Arc<ActivityBus>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let tokens = TokenService::new(&config.jwt_secret, config.admin_roles.clone());
        let bus = ActivityBus::new(config.history_per_tenant, config.max_tenants);
        Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            bus: Arc::new(bus),
        }
    }
}

/// Error body returned by API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub bus_type: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        bus_type: BUS_TYPE.to_string(),
    })
}

/// Build the complete application router
pub fn router(state: AppState) -> Router {
    let cors_origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = Router::new()
        .route("/health", get(health))
        .merge(feed::routes())
        .merge(activities::routes())
        .with_state(state);

    let app = if cors_origins.is_empty() {
        app
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

/// Current time as fractional Unix seconds, the wire format of timestamps
pub(crate) fn unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
