//! Dispatcher: the synchronous facade over the asynchronous transport.
//!
//! [`Dispatcher::send`] publishes a request envelope and waits for the reply
//! carrying the same correlation ID, or for the deadline, whichever comes
//! first.
//!
//! # Example
//!
//! ```rust,ignore
//! let request = OutboundRequest::new("login", "api-gateway-topic", "user-service-topic")
//!     .with_key("user-login")
//!     .with_json_payload(&credentials)?;
//!
//! let reply = dispatcher.send(request).await?;
//! if reply.is_success() {
//!     let session: Session = reply.data_as()?;
//! }
//! ```

use crate::metrics::BridgeMetrics;
use crate::registry::CorrelationRegistry;
use kafka_bridge_core::envelope::{self, payload_from};
use kafka_bridge_core::{BridgeError, CorrelationId, ReplyEnvelope, Transport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Deadline applied when neither the request nor the dispatcher sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A request to bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Logical operation, e.g. `"login"`.
    pub request_type: String,
    /// Serialized request body.
    pub payload: String,
    /// Topic the request is published to.
    pub topic: String,
    /// Topic the responder replies to.
    pub reply_to: String,
    /// Message key, used by the broker for partitioning.
    pub key: String,
    /// Per-request deadline, overriding the dispatcher default.
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    /// Create a request with an empty payload, keyed by its request type.
    #[must_use]
    pub fn new(
        request_type: impl Into<String>,
        topic: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        let request_type = request_type.into();
        Self {
            key: request_type.clone(),
            request_type,
            payload: String::new(),
            topic: topic.into(),
            reply_to: reply_to.into(),
            timeout: None,
        }
    }

    /// Set an already serialized payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Serialize `payload` as JSON and use it as the request body.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Encode`] if `payload` cannot be serialized.
    pub fn with_json_payload<T: Serialize + ?Sized>(
        mut self,
        payload: &T,
    ) -> Result<Self, BridgeError> {
        self.payload = payload_from(payload).map_err(BridgeError::Encode)?;
        Ok(self)
    }

    /// Set the message key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set a per-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A reply delivered to a dispatch call.
///
/// `success == false` is a domain failure reported by the responder, not a
/// bridge error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    envelope: ReplyEnvelope,
    elapsed: Duration,
}

impl Reply {
    /// Build a reply from a delivered envelope.
    #[must_use]
    pub const fn from_parts(envelope: ReplyEnvelope, elapsed: Duration) -> Self {
        Self { envelope, elapsed }
    }

    /// Correlation ID the reply was matched on.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.envelope.correlation_id
    }

    /// Whether the responder reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.envelope.success
    }

    /// Serialized reply data.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.envelope.data
    }

    /// Failure reason, empty on success.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.envelope.error
    }

    /// Time between dispatch and delivery.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The raw envelope.
    #[must_use]
    pub const fn envelope(&self) -> &ReplyEnvelope {
        &self.envelope
    }

    /// Consume the reply, returning the raw envelope.
    #[must_use]
    pub fn into_envelope(self) -> ReplyEnvelope {
        self.envelope
    }

    /// Deserialize the reply data as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Decode`] if the data is not a valid `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, BridgeError> {
        self.envelope.data_as().map_err(BridgeError::Decode)
    }

    /// Split into the success data or the domain failure.
    ///
    /// # Errors
    ///
    /// Returns [`DomainFailure`] if the responder reported failure.
    pub fn into_result(self) -> Result<String, DomainFailure> {
        if self.envelope.success {
            Ok(self.envelope.data)
        } else {
            Err(DomainFailure {
                correlation_id: self.envelope.correlation_id,
                reason: self.envelope.error,
            })
        }
    }
}

/// A business-level rejection reported by a responder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Request {correlation_id} was rejected: {reason}")]
pub struct DomainFailure {
    /// Correlation ID of the rejected request.
    pub correlation_id: CorrelationId,
    /// Reason given by the responder.
    pub reason: String,
}

/// Publishes requests and waits for their replies.
///
/// Cheap to share behind an `Arc`; every call is independent.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    registry: Arc<CorrelationRegistry>,
    default_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<CorrelationRegistry>) -> Self {
        Self {
            transport,
            registry,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the default deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The registry this dispatcher registers waiters in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Deadline used when a request sets none.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Publish `request` and wait for its reply.
    ///
    /// The waiter is registered before publishing and removed on every exit
    /// path, including cancellation of the returned future. The deadline
    /// starts once the request is published.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Encode`] if the envelope cannot be encoded
    /// - [`BridgeError::Publish`] if the transport rejects the request
    /// - [`BridgeError::Timeout`] if no reply arrives before the deadline
    /// - [`BridgeError::DuplicateCorrelationId`] on an ID collision
    #[tracing::instrument(
        skip(self, request),
        name = "bridge_send",
        fields(request_type = %request.request_type, topic = %request.topic)
    )]
    pub async fn send(&self, request: OutboundRequest) -> Result<Reply, BridgeError> {
        let started = Instant::now();
        let result = self.dispatch(&request).await;

        let outcome = match &result {
            Ok(reply) if reply.is_success() => "success",
            Ok(_) => "domain_failure",
            Err(e) => e.label(),
        };
        BridgeMetrics::record_request(&request.request_type, outcome, started.elapsed());

        result
    }

    async fn dispatch(&self, request: &OutboundRequest) -> Result<Reply, BridgeError> {
        let id = CorrelationId::new();
        let mut registration = self.registry.register(id, &request.request_type)?;

        let bytes = envelope::encode_request(
            &request.request_type,
            id,
            &request.reply_to,
            &request.payload,
        )
        .map_err(BridgeError::Encode)?;

        if let Err(e) = self
            .transport
            .publish(&request.topic, request.key.as_bytes(), &bytes)
            .await
        {
            BridgeMetrics::record_publish_error();
            warn!(correlation_id = %id, error = %e, "Failed to publish request");
            return Err(BridgeError::Publish(e));
        }
        debug!(correlation_id = %id, reply_to = %request.reply_to, "Published request");

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let waited = tokio::time::timeout(timeout, registration.wait()).await;
        match waited {
            Ok(Ok(envelope)) => {
                let elapsed = registration.created_at().elapsed();
                debug!(
                    correlation_id = %id,
                    success = envelope.success,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Received reply"
                );
                Ok(Reply { envelope, elapsed })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                BridgeMetrics::record_timeout();
                warn!(
                    correlation_id = %id,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Request timed out"
                );
                Err(BridgeError::Timeout {
                    correlation_id: id,
                    request_type: request.request_type.clone(),
                    timeout,
                })
            }
        }
    }
}
