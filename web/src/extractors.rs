//! Custom Axum extractors for authenticated requests.
//!
//! - [`AuthContext`]: the caller identity stored by
//!   [`BearerAuthLayer`](crate::middleware::BearerAuthLayer)
//! - [`RequireRole`]: the same identity, rejected unless it carries a role
//!
//! # Examples
//!
//! ```ignore
//! use kafka_bridge_web::extractors::{Admin, AuthContext, RequireRole};
//!
//! async fn profile(auth: AuthContext) -> String {
//!     format!("Hello, {}", auth.email)
//! }
//!
//! async fn delete_product(RequireRole(auth, ..): RequireRole<Admin>) -> StatusCode {
//!     tracing::info!(subject = %auth.subject, "Admin deleting product");
//!     StatusCode::NO_CONTENT
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use kafka_bridge_core::TokenClaims;
use std::marker::PhantomData;

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// User the token was issued to.
    pub subject: String,
    /// User email.
    pub email: String,
    /// User role.
    pub role: String,
    /// Token ID (used for revocation on logout).
    pub token_id: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl From<TokenClaims> for AuthContext {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.subject,
            email: claims.email,
            role: claims.role,
            token_id: claims.token_id,
            expires_at: claims.expires_at,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("User role not found"))
    }
}

/// A role name known at compile time.
pub trait Role: Send + Sync + 'static {
    /// Role string as carried in token claims.
    const NAME: &'static str;
}

/// The `"admin"` role.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl Role for Admin {
    const NAME: &'static str = "admin";
}

/// Authenticated caller holding role `R`.
///
/// Rejects with 401 when no [`AuthContext`] is present and with 403
/// "Insufficient permissions" when the role differs.
#[derive(Debug, Clone)]
pub struct RequireRole<R: Role>(pub AuthContext, pub PhantomData<R>);

impl<R: Role> RequireRole<R> {
    /// The authenticated caller.
    #[must_use]
    pub const fn context(&self) -> &AuthContext {
        &self.0
    }
}

#[async_trait]
impl<S, R> FromRequestParts<S> for RequireRole<R>
where
    S: Send + Sync,
    R: Role,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = AuthContext::from_request_parts(parts, state).await?;
        if context.role != R::NAME {
            tracing::debug!(
                subject = %context.subject,
                role = %context.role,
                required = R::NAME,
                "Role check failed"
            );
            return Err(AppError::forbidden("Insufficient permissions"));
        }
        Ok(Self(context, PhantomData))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn context(role: &str) -> AuthContext {
        AuthContext {
            subject: "user-1".to_string(),
            email: "user-1@example.com".to_string(),
            role: role.to_string(),
            token_id: "token-1".to_string(),
            expires_at: Utc::now(),
        }
    }

    fn parts_with(context: Option<AuthContext>) -> Parts {
        let mut req = Request::builder().body(()).expect("Valid request");
        if let Some(context) = context {
            req.extensions_mut().insert(context);
        }
        req.into_parts().0
    }

    #[tokio::test]
    async fn test_auth_context_from_extensions() {
        let mut parts = parts_with(Some(context("user")));
        let auth = AuthContext::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(auth.subject, "user-1");
    }

    #[tokio::test]
    async fn test_auth_context_missing_is_unauthorized() {
        let mut parts = parts_with(None);
        let err = AuthContext::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_role_accepts_matching_role() {
        let mut parts = parts_with(Some(context("admin")));
        let admin = RequireRole::<Admin>::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(admin.context().role, "admin");
    }

    #[tokio::test]
    async fn test_require_role_rejects_other_role() {
        let mut parts = parts_with(Some(context("user")));
        let err = RequireRole::<Admin>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Insufficient permissions");
    }
}
