//! Mock auth gate.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{Duration, Utc};
use kafka_bridge_core::{AuthGate, AuthGateError, TokenClaims};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct State {
    tokens: HashMap<String, TokenClaims>,
    revoked: HashSet<String>,
    store_down: bool,
}

/// Auth gate backed by a token table.
///
/// Tokens are opaque strings mapped to claims; anything not in the table is
/// invalid.
///
/// # Example
///
/// ```
/// use kafka_bridge_testing::MockAuthGate;
///
/// let gate = MockAuthGate::new().with_user("token-1", "user-1", "admin");
/// gate.revoke("token-1");
/// ```
#[derive(Clone, Default)]
pub struct MockAuthGate {
    state: Arc<RwLock<State>>,
}

impl MockAuthGate {
    /// Create a gate that accepts no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` with the given claims.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>, claims: TokenClaims) -> Self {
        self.state.write().unwrap().tokens.insert(token.into(), claims);
        self
    }

    /// Accept `token` for `subject` with `role`, expiring in an hour.
    ///
    /// The token ID is the token itself.
    #[must_use]
    pub fn with_user(self, token: &str, subject: &str, role: &str) -> Self {
        let claims = TokenClaims {
            subject: subject.to_string(),
            email: format!("{subject}@example.com"),
            role: role.to_string(),
            token_id: token.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        self.with_token(token, claims)
    }

    /// Revoke the token with ID `token_id`.
    pub fn revoke(&self, token_id: &str) {
        self.state.write().unwrap().revoked.insert(token_id.to_string());
    }

    /// Make revocation lookups fail.
    pub fn set_store_down(&self, down: bool) {
        self.state.write().unwrap().store_down = down;
    }
}

impl AuthGate for MockAuthGate {
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthGateError> {
        let state = self.state.read().unwrap();
        let claims = state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthGateError::InvalidToken("unknown token".to_string()))?;
        if claims.expires_at <= Utc::now() {
            return Err(AuthGateError::InvalidToken("token expired".to_string()));
        }
        Ok(claims)
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, AuthGateError> {
        let state = self.state.read().unwrap();
        if state.store_down {
            return Err(AuthGateError::StoreUnavailable(
                "revocation store unreachable".to_string(),
            ));
        }
        Ok(state.revoked.contains(token_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_and_revoke() {
        let gate = MockAuthGate::new().with_user("t1", "u1", "user");

        let claims = gate.validate("t1").await.unwrap();
        assert_eq!(claims.subject, "u1");
        assert_eq!(claims.role, "user");
        assert!(!gate.is_revoked("t1").await.unwrap());

        gate.revoke("t1");
        assert!(gate.is_revoked("t1").await.unwrap());
        assert!(matches!(
            gate.validate("nope").await,
            Err(AuthGateError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_and_store_down() {
        let mut claims = MockAuthGate::new()
            .with_user("t1", "u1", "user")
            .validate("t1")
            .await
            .unwrap();
        claims.expires_at = Utc::now() - Duration::minutes(1);
        let gate = MockAuthGate::new().with_token("old", claims);

        assert!(gate.validate("old").await.is_err());

        gate.set_store_down(true);
        assert!(matches!(
            gate.is_revoked("old").await,
            Err(AuthGateError::StoreUnavailable(_))
        ));
    }
}
