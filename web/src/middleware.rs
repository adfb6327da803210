//! Bearer-token authentication middleware.
//!
//! [`BearerAuthLayer`] guards routes with an [`AuthGate`]:
//!
//! 1. **Extract** the token from `Authorization: Bearer <token>`
//! 2. **Validate** it through the gate
//! 3. **Check** the revocation list (unless disabled for the route)
//! 4. **Store** an [`AuthContext`] in request extensions for handlers
//!
//! Failures short-circuit with 401 before the inner service runs.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use kafka_bridge_web::middleware::BearerAuthLayer;
//!
//! let app = Router::new()
//!     .route("/api/users/profile", get(profile))
//!     .route_layer(BearerAuthLayer::new(Arc::new(gate)));
//! ```

use crate::error::AppError;
use crate::extractors::AuthContext;
use axum::{
    extract::Request,
    http::{HeaderMap, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use kafka_bridge_core::{AuthGate, AuthGateError};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

const BEARER_PREFIX: &str = "Bearer ";

/// Layer that authenticates requests with a bearer token.
pub struct BearerAuthLayer<G> {
    gate: Arc<G>,
    check_revocation: bool,
}

impl<G> Clone for BearerAuthLayer<G> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            check_revocation: self.check_revocation,
        }
    }
}

impl<G: AuthGate> BearerAuthLayer<G> {
    /// Authenticate with `gate`, rejecting revoked tokens.
    #[must_use]
    pub const fn new(gate: Arc<G>) -> Self {
        Self {
            gate,
            check_revocation: true,
        }
    }

    /// Accept revoked tokens that still validate.
    ///
    /// Used on routes such as logout that must work for a token about to be
    /// revoked.
    #[must_use]
    pub const fn without_revocation_check(mut self) -> Self {
        self.check_revocation = false;
        self
    }
}

impl<S, G> Layer<S> for BearerAuthLayer<G> {
    type Service = BearerAuth<S, G>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            inner,
            gate: Arc::clone(&self.gate),
            check_revocation: self.check_revocation,
        }
    }
}

/// Middleware service produced by [`BearerAuthLayer`].
pub struct BearerAuth<S, G> {
    inner: S,
    gate: Arc<G>,
    check_revocation: bool,
}

impl<S: Clone, G> Clone for BearerAuth<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
            check_revocation: self.check_revocation,
        }
    }
}

impl<S, G> Service<Request> for BearerAuth<S, G>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    G: AuthGate + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // The readied service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = Arc::clone(&self.gate);
        let check_revocation = self.check_revocation;

        let token = bearer_token(req.headers()).map(ToString::to_string);

        Box::pin(async move {
            let context = match token {
                Ok(token) => authenticate(gate.as_ref(), &token, check_revocation).await,
                Err(rejection) => Err(rejection),
            };
            match context {
                Ok(context) => {
                    req.extensions_mut().insert(context);
                    inner.call(req).await
                }
                Err(rejection) => Ok(rejection.into_response()),
            }
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("Authorization header required"))?;
    let value = header
        .to_str()
        .map_err(|_| AppError::unauthorized("Bearer token required"))?;
    if value.is_empty() {
        return Err(AppError::unauthorized("Authorization header required"));
    }
    value
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| AppError::unauthorized("Bearer token required"))
}

async fn authenticate<G: AuthGate>(
    gate: &G,
    token: &str,
    check_revocation: bool,
) -> Result<AuthContext, AppError> {
    let claims = gate.validate(token).await.map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        AppError::unauthorized("Invalid token")
    })?;

    if check_revocation {
        match gate.is_revoked(&claims.token_id).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(token_id = %claims.token_id, "Rejected revoked token");
                return Err(AppError::unauthorized("Revoked token"));
            }
            Err(AuthGateError::StoreUnavailable(reason)) => {
                return Err(AppError::unavailable("Token revocation check unavailable")
                    .with_source(anyhow::anyhow!(reason)));
            }
            Err(AuthGateError::InvalidToken(_)) => {
                return Err(AppError::unauthorized("Invalid token"));
            }
        }
    }

    tracing::debug!(subject = %claims.subject, "Token validated");
    Ok(AuthContext::from(claims))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::error::ErrorResponse;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use kafka_bridge_testing::MockAuthGate;
    use tower::ServiceExt;

    async fn whoami(auth: AuthContext) -> String {
        format!("{}:{}", auth.subject, auth.role)
    }

    fn app(layer: BearerAuthLayer<MockAuthGate>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(layer)
    }

    fn gate() -> MockAuthGate {
        MockAuthGate::new().with_user("good-token", "user-1", "user")
    }

    async fn call(app: Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if status.is_success() {
            String::from_utf8(bytes.to_vec()).unwrap()
        } else {
            serde_json::from_slice::<ErrorResponse>(&bytes).unwrap().message
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let app = app(BearerAuthLayer::new(Arc::new(gate())));
        let (status, body) = call(app, Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-1:user");
    }

    #[tokio::test]
    async fn test_missing_header() {
        let app = app(BearerAuthLayer::new(Arc::new(gate())));
        let (status, body) = call(app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Authorization header required");
    }

    #[tokio::test]
    async fn test_non_bearer_scheme() {
        let app = app(BearerAuthLayer::new(Arc::new(gate())));
        let (status, body) = call(app, Some("Basic dXNlcjpwdw==")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Bearer token required");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let app = app(BearerAuthLayer::new(Arc::new(gate())));
        let (status, body) = call(app, Some("Bearer forged")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Invalid token");
    }

    #[tokio::test]
    async fn test_revoked_token() {
        let gate = gate();
        gate.revoke("good-token");
        let app = app(BearerAuthLayer::new(Arc::new(gate)));
        let (status, body) = call(app, Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Revoked token");
    }

    #[tokio::test]
    async fn test_revoked_token_allowed_without_check() {
        let gate = gate();
        gate.revoke("good-token");
        let app = app(BearerAuthLayer::new(Arc::new(gate)).without_revocation_check());
        let (status, _) = call(app, Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_revocation_store_down_fails_closed() {
        let gate = gate();
        gate.set_store_down(true);
        let app = app(BearerAuthLayer::new(Arc::new(gate)));
        let (status, _) = call(app, Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
