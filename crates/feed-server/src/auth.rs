// Admin token service and request authentication
// Decision: HS256 with a shared secret; tokens carry a single `role` claim
// Decision: The tenant scope may come from the token (`tenant_id` claim)

use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{AppState, ErrorResponse};

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid admin token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Admin privileges required")]
    InsufficientPrivileges,

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Error code reported to feed connections
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::InsufficientPrivileges => "INSUFFICIENT_PRIVILEGES",
            AuthError::Signing(_) => "AUTH_NOT_CONFIGURED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPrivileges => StatusCode::FORBIDDEN,
            AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// Claims of an admin token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (admin user id)
    pub sub: String,
    pub role: String,
    /// Tenant the admin is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

/// Signs and validates admin tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    admin_roles: Vec<String>,
}

impl TokenService {
    pub fn new(secret: &str, admin_roles: Vec<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            admin_roles,
        }
    }

    /// Mint a token for `sub` with `role`, valid for `ttl`
    pub fn mint(
        &self,
        sub: &str,
        role: &str,
        tenant_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            tenant_id: tenant_id.map(String::from),
            exp: now + ttl.as_secs() as i64,
            iat: now,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(AuthError::Signing)
    }

    /// Verify signature and expiry, then require an admin role
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        if !self.admin_roles.iter().any(|r| *r == claims.role) {
            tracing::debug!(sub = %claims.sub, role = %claims.role, "Rejected non-admin token");
            return Err(AuthError::InsufficientPrivileges);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("admin_roles", &self.admin_roles)
            .finish_non_exhaustive()
    }
}

/// Authenticated admin extracted from the `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl AdminUser {
    pub fn tenant_id(&self) -> Option<&str> {
        self.0.tenant_id.as_deref().filter(|t| !t.is_empty())
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;

        state.tokens.validate(token).map(AdminUser)
    }
}
