//! Error types for web handlers.
//!
//! [`AppError`] is the single error type returned by handlers and rejected
//! by extractors and middleware. It maps bridge failures onto HTTP status
//! codes and renders a JSON body through Axum's `IntoResponse`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kafka_bridge_core::{BridgeError, BridgeErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn login(State(state): State<AppState>) -> Result<ServiceResponse, AppError> {
///     // Timeouts become 504, other bridge failures 500.
///     let reply = state.dispatcher().send(request).await?;
///     Ok(ServiceResponse::new(reply, "Login successful").for_auth_operation())
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            message.into(),
            "UNAUTHORIZED".to_string(),
        )
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            message.into(),
            "FORBIDDEN".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// Create a 504 Gateway Timeout error.
    #[must_use]
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            message.into(),
            "GATEWAY_TIMEOUT".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (for client error handling).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Bridged request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Bridged request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Map a bridge failure onto a status code.
///
/// Only the deadline is distinguished for clients (504); every other failure
/// is the gateway's own fault (500).
impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        let error = match err.kind() {
            BridgeErrorKind::Timeout => {
                Self::gateway_timeout("Timeout waiting for response from service")
            }
            BridgeErrorKind::Transport => Self::internal("Failed to send request to service"),
            BridgeErrorKind::Codec => Self::internal("Invalid message exchanged with service"),
            BridgeErrorKind::Internal => Self::internal("An internal error occurred"),
        };
        error.with_source(anyhow::Error::new(err))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use kafka_bridge_core::{CodecError, CorrelationId, TransportError};
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = AppError::from(BridgeError::Timeout {
            correlation_id: CorrelationId::new(),
            request_type: "login".to_string(),
            timeout: Duration::from_secs(10),
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "GATEWAY_TIMEOUT");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_other_bridge_failures_are_internal() {
        let failures = [
            BridgeError::Publish(TransportError::PublishFailed {
                topic: "api-gateway-topic".to_string(),
                reason: "broker down".to_string(),
            }),
            BridgeError::Encode(CodecError::UnexpectedData("bad".to_string())),
            BridgeError::Decode(CodecError::UnexpectedData("bad".to_string())),
            BridgeError::WaiterDropped(CorrelationId::new()),
        ];
        for failure in failures {
            assert_eq!(
                AppError::from(failure).status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    #[tokio::test]
    async fn test_body_hides_source() {
        let err = AppError::internal("An internal error occurred")
            .with_source(anyhow::anyhow!("connection refused by 10.0.0.7"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "INTERNAL_SERVER_ERROR");
        assert!(!body.message.contains("10.0.0.7"));
    }
}
