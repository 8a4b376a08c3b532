// Activity Event Schema
//
// Events are created by the server and are read-only to feed clients.
// Structure: id, type, tenant_id, ts, details.
// Every event belongs to exactly one tenant; the wildcard tenant is visible
// to every viewer regardless of their own tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved tenant whose events are visible to all viewers
pub const WILDCARD_TENANT: &str = "default";

// ============================================================================
// Event Type Constants
// ============================================================================

// Document pipeline events
pub const DOCUMENT_PROCESSED: &str = "document_processed";
pub const DOCUMENT_FAILED: &str = "document_failed";
pub const OCR_COMPLETED: &str = "ocr_completed";

// Admin events
pub const ADMIN_ACTION: &str = "admin_action";
pub const USER_LOGIN: &str = "user_login";

// ============================================================================
// Event
// ============================================================================

/// One tenant-scoped occurrence pushed over the activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque unique identifier
    pub id: String,

    /// Type tag classifying the event (e.g. "document_failed")
    #[serde(rename = "type")]
    pub event_type: String,

    /// Owning tenant
    pub tenant_id: String,

    /// When the server recorded the event
    #[serde(alias = "timestamp")]
    pub ts: DateTime<Utc>,

    /// Event-specific metadata
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Event {
    /// Create an event stamped with the current time and no details
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            tenant_id: tenant_id.into(),
            ts: Utc::now(),
            details: Map::new(),
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    /// Whether this event belongs to the wildcard tenant
    pub fn is_wildcard(&self) -> bool {
        self.tenant_id == WILDCARD_TENANT
    }

    /// Whether a viewer scoped to `tenant_id` may see this event
    pub fn visible_to(&self, tenant_id: &str) -> bool {
        self.tenant_id == tenant_id || self.is_wildcard()
    }
}
