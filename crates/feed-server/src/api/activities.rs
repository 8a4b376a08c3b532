// Admin activity HTTP routes
// Publishing here is the only way events enter the bus

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use docflow_feed_core::{Event, WILDCARD_TENANT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{AppState, ErrorResponse};
use crate::auth::AdminUser;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Window of events the summary is computed over
const SUMMARY_WINDOW: usize = 200;

/// Request to publish an activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivityRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Defaults to the token's tenant, then the wildcard tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ActivitiesQuery {
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityListResponse {
    pub activities: Vec<Event>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub tenant_id: String,
    pub total_activities: usize,
    pub activities_by_type: BTreeMap<String, usize>,
    /// Activities from the last hour
    pub recent_activity_count: usize,
    pub timestamp: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/activities",
            get(list_activities).post(create_activity),
        )
        .route("/api/admin/summary", get(summary))
}

/// Tenant from the request, else from the token, else the wildcard tenant
fn effective_tenant(requested: Option<String>, admin: &AdminUser) -> String {
    requested
        .filter(|t| !t.trim().is_empty())
        .or_else(|| admin.tenant_id().map(String::from))
        .unwrap_or_else(|| WILDCARD_TENANT.to_string())
}

/// POST /api/admin/activities - Publish an activity
pub async fn create_activity(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<CreateActivityRequest>,
) -> Result<(StatusCode, Json<Event>), (StatusCode, Json<ErrorResponse>)> {
    let event_type = req.event_type.trim();
    if event_type.is_empty() {
        return Err(ErrorResponse::new("Activity type must not be empty")
            .into_response(StatusCode::BAD_REQUEST));
    }

    let tenant_id = effective_tenant(req.tenant_id, &admin);
    let event = Event::new(Uuid::now_v7().to_string(), event_type, tenant_id)
        .with_details(req.details);

    let delivered = state.bus.publish(event.clone());
    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        tenant_id = %event.tenant_id,
        sub = %admin.0.sub,
        subscribers = delivered,
        "Activity created"
    );

    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/admin/activities - Recent activities of a tenant, newest first
pub async fn list_activities(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<ActivitiesQuery>,
) -> Json<ActivityListResponse> {
    let tenant_id = effective_tenant(query.tenant_id, &admin);
    let per_page = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    Json(ActivityListResponse {
        activities: state.bus.recent(&tenant_id, per_page),
        total: state.bus.count(&tenant_id),
        page: 1,
        per_page,
    })
}

/// GET /api/admin/summary - Activity counts of a tenant
pub async fn summary(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<SummaryQuery>,
) -> Json<ActivitySummary> {
    let tenant_id = effective_tenant(query.tenant_id, &admin);
    let recent = state.bus.recent(&tenant_id, SUMMARY_WINDOW);

    let now = Utc::now();
    let mut activities_by_type = BTreeMap::new();
    let mut recent_activity_count = 0;
    for event in &recent {
        *activities_by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        if now.signed_duration_since(event.ts) < chrono::Duration::hours(1) {
            recent_activity_count += 1;
        }
    }

    Json(ActivitySummary {
        tenant_id,
        total_activities: recent.len(),
        activities_by_type,
        recent_activity_count,
        timestamp: now,
    })
}
