// Tenant Feed Server
//
// Reference server for the tenant activity feed:
// - /api/admin/feed: WebSocket feed with first-message authentication
// - /api/admin/activities: publish and list activities (Bearer admin token)
// - /api/admin/summary: per-type activity counts
// - /health
//
// Events live in an in-memory bus; nothing survives a restart.

pub mod api;
pub mod auth;
pub mod bus;
pub mod config;

pub use api::{router, AppState};
pub use auth::{AdminUser, AuthError, Claims, TokenService};
pub use bus::ActivityBus;
pub use config::ServerConfig;

use tokio::net::TcpListener;

/// Serve the feed API on an already bound listener until the server stops
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
