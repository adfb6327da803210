//! Rendering bridged replies as HTTP responses.

use crate::error::AppError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kafka_bridge_core::CorrelationId;
use kafka_bridge_runtime::Reply;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A service reply on its way back to the HTTP caller.
///
/// A successful reply renders as 200 with a [`SuccessBody`]. A domain failure
/// (`success == false`) renders as 400 carrying the service's error text, or
/// as 401 for authentication operations such as login.
///
/// # Example
///
/// ```ignore
/// async fn login(
///     State(state): State<AppState>,
///     Json(credentials): Json<Credentials>,
/// ) -> WebResult<ServiceResponse> {
///     let request = state
///         .request("login", "user-service-topic")
///         .with_json_payload(&credentials)?;
///     let reply = state.dispatcher().send(request).await?;
///     Ok(ServiceResponse::new(reply, "Login successful").for_auth_operation())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    reply: Reply,
    message: String,
    auth_operation: bool,
}

/// Body of a successful service response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBody {
    /// Human-readable summary chosen by the handler.
    pub message: String,
    /// Correlation ID of the bridged request.
    pub correlation_id: CorrelationId,
    /// Reply data: parsed JSON when it parses, the raw string otherwise.
    pub data: Value,
}

impl ServiceResponse {
    /// Wrap a reply with the message shown on success.
    #[must_use]
    pub fn new(reply: Reply, message: impl Into<String>) -> Self {
        Self {
            reply,
            message: message.into(),
            auth_operation: false,
        }
    }

    /// Report domain failures as 401 instead of 400.
    #[must_use]
    pub const fn for_auth_operation(mut self) -> Self {
        self.auth_operation = true;
        self
    }

    /// The wrapped reply.
    #[must_use]
    pub const fn reply(&self) -> &Reply {
        &self.reply
    }
}

fn parse_data(data: &str) -> Value {
    serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()))
}

impl IntoResponse for ServiceResponse {
    fn into_response(self) -> Response {
        if !self.reply.is_success() {
            let error = if self.auth_operation {
                AppError::unauthorized(self.reply.error())
            } else {
                AppError::bad_request(self.reply.error())
            };
            return error.into_response();
        }

        let body = SuccessBody {
            message: self.message,
            correlation_id: self.reply.correlation_id(),
            data: parse_data(self.reply.data()),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}
