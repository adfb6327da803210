//! Axum edge for the Kafka request/reply bridge.
//!
//! HTTP handlers turn an incoming request into a bridged
//! [`OutboundRequest`](kafka_bridge_runtime::OutboundRequest), await the reply
//! through the [`Dispatcher`](kafka_bridge_runtime::Dispatcher), and render
//! the outcome.
//!
//! # Request Flow
//!
//! 1. **Authenticate** the caller ([`BearerAuthLayer`], [`RequireRole`])
//! 2. **Build** the outbound request from the HTTP body
//! 3. **Dispatch** it and wait for the correlated reply
//! 4. **Map** the outcome to HTTP: [`ServiceResponse`] for replies,
//!    [`AppError`] for bridge failures
//!
//! | Outcome                     | Status |
//! |-----------------------------|--------|
//! | reply, `success == true`    | 200    |
//! | reply, `success == false`   | 400 (401 for auth operations) |
//! | deadline elapsed            | 504    |
//! | publish/codec/internal      | 500    |
//!
//! # Example
//!
//! ```ignore
//! use axum::{Json, Router, extract::State, routing::post};
//! use kafka_bridge_web::{AppState, ServiceResponse, WebResult};
//!
//! async fn login(
//!     State(state): State<AppState>,
//!     Json(credentials): Json<serde_json::Value>,
//! ) -> WebResult<ServiceResponse> {
//!     let request = state
//!         .request("login", "user-service-topic")
//!         .with_key("user-login")
//!         .with_json_payload(&credentials)?;
//!     let reply = state.dispatcher().send(request).await?;
//!     Ok(ServiceResponse::new(reply, "Login successful").for_auth_operation())
//! }
//!
//! let app = Router::new()
//!     .route("/api/auth/login", post(login))
//!     .merge(kafka_bridge_web::router(state.clone()))
//!     .with_state(state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod state;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::{AppError, ErrorResponse};
pub use extractors::{Admin, AuthContext, RequireRole, Role};
pub use middleware::{BearerAuth, BearerAuthLayer};
pub use response::{ServiceResponse, SuccessBody};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Health routes (`/health`, `/health/services`) and the Prometheus scrape
/// route (`/metrics`), with request tracing.
///
/// The returned router already carries its state, so it merges into an
/// application router of any state type.
#[must_use]
pub fn router<S>(state: AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/services", get(handlers::services_health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
