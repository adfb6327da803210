//! Auth gate boundary.
//!
//! Callers of the bridge present a bearer token. Verifying that token and
//! checking the revocation list are external capabilities: the bridge consumes
//! them through [`AuthGate`] and never implements token cryptography or the
//! revocation store itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by an auth gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthGateError {
    /// The token is malformed, expired or carries a bad signature.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The backing revocation store could not be reached.
    #[error("Revocation store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User the token was issued to.
    pub subject: String,
    /// User email.
    pub email: String,
    /// Role, e.g. `"user"` or `"admin"`.
    pub role: String,
    /// Unique token ID (used for revocation).
    pub token_id: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Token validation and revocation lookups.
///
/// Both operations are side-effecting lookups against external systems.
pub trait AuthGate: Send + Sync {
    /// Validate a bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthGateError::InvalidToken`] if the token does not verify.
    fn validate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<TokenClaims, AuthGateError>> + Send;

    /// Whether the token with this ID has been revoked (e.g. by logout).
    ///
    /// # Errors
    ///
    /// Returns [`AuthGateError::StoreUnavailable`] if the lookup fails.
    fn is_revoked(
        &self,
        token_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, AuthGateError>> + Send;
}
