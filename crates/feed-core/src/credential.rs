// Bearer credential pre-validation
// Decision: The client only checks shape (segments, decodable payload, role claim);
// signature verification belongs to the server.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde_json::Value;
use thiserror::Error;

/// Why a credential was rejected before connecting
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("No admin token provided")]
    Missing,

    #[error("Token validation failed: {0}")]
    Malformed(String),

    #[error("Token validation failed: Invalid admin token format")]
    MissingRole,
}

/// A bearer token whose payload carries a role claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    role: String,
}

impl Credential {
    /// Validate a raw token string
    ///
    /// The token must have at least two dot-separated segments; the second
    /// one must be base64url (or standard base64) encoded JSON containing a
    /// non-empty `role` claim.
    pub fn parse(token: &str) -> Result<Self, CredentialError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Missing);
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() < 2 || segments[1].is_empty() {
            return Err(CredentialError::Malformed(
                "expected dot-separated header and payload segments".to_string(),
            ));
        }

        let payload = decode_segment(segments[1])?;
        let claims: Value = serde_json::from_slice(&payload)
            .map_err(|e| CredentialError::Malformed(format!("payload is not JSON: {}", e)))?;

        if !claims.is_object() {
            return Err(CredentialError::Malformed(
                "payload is not a JSON object".to_string(),
            ));
        }

        let role = match claims.get("role") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {
                return Err(CredentialError::MissingRole)
            }
            Some(Value::String(role)) if role.is_empty() => {
                return Err(CredentialError::MissingRole)
            }
            Some(Value::String(role)) => role.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            token: token.to_string(),
            role,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, CredentialError> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| CredentialError::Malformed(format!("payload is not base64: {}", e)))
}
