//! # Kafka Bridge Testing
//!
//! Testing utilities for the Kafka request/reply bridge.
//!
//! This crate provides:
//! - [`InMemoryTransport`]: topic fan-out without a broker
//! - [`EchoResponder`]: a scripted backend service
//! - [`MockAuthGate`]: token table with revocation
//! - Property-based strategies for envelopes
//!
//! ## Example
//!
//! ```ignore
//! use kafka_bridge_testing::{EchoResponder, InMemoryTransport};
//!
//! #[tokio::test]
//! async fn test_login() {
//!     let transport = InMemoryTransport::new();
//!     let _service = EchoResponder::echo()
//!         .spawn(transport.clone(), "api-gateway-topic")
//!         .await
//!         .unwrap();
//!
//!     let bridge = Bridge::start(Arc::new(transport), &BridgeConfig::default())
//!         .await
//!         .unwrap();
//!     let reply = bridge
//!         .dispatcher()
//!         .send(bridge.request("login", "user-service-topic"))
//!         .await
//!         .unwrap();
//!     assert!(reply.is_success());
//! }
//! ```

pub mod auth;
pub mod responder;
pub mod transport;

/// Test helpers.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a `tracing` subscriber that writes to the test output.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use kafka_bridge_core::envelope::RequestEnvelope;
    use kafka_bridge_core::{CorrelationId, ReplyEnvelope};
    use proptest::prelude::*;

    /// Any correlation ID.
    pub fn arb_correlation_id() -> impl Strategy<Value = CorrelationId> {
        any::<u128>().prop_map(|raw| CorrelationId::from(uuid::Uuid::from_u128(raw)))
    }

    /// Any reply envelope. Failures carry a non-empty reason.
    pub fn arb_reply() -> impl Strategy<Value = ReplyEnvelope> {
        (arb_correlation_id(), any::<bool>(), ".*", ".+").prop_map(
            |(id, success, data, error)| {
                if success {
                    ReplyEnvelope::success(id, data)
                } else {
                    ReplyEnvelope::failure(id, error)
                }
            },
        )
    }

    /// Any request envelope with a kebab-case type.
    pub fn arb_request() -> impl Strategy<Value = RequestEnvelope> {
        (
            "[a-z]{1,8}(-[a-z]{1,8}){0,2}",
            arb_correlation_id(),
            "[a-z]{1,12}-topic",
            ".*",
        )
            .prop_map(|(request_type, correlation_id, reply_to, payload)| RequestEnvelope {
                request_type,
                correlation_id,
                reply_to,
                payload,
            })
    }
}

// Re-export commonly used items
pub use auth::MockAuthGate;
pub use helpers::init_tracing;
pub use responder::{EchoResponder, EchoResponderBuilder};
pub use transport::InMemoryTransport;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::properties::{arb_reply, arb_request};
    use kafka_bridge_core::envelope;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn request_round_trips(request in arb_request()) {
            let bytes = request.encode().unwrap();
            prop_assert_eq!(envelope::decode_request(&bytes).unwrap(), request);
        }

        #[test]
        fn failed_replies_keep_their_reason(reply in arb_reply()) {
            let decoded = envelope::decode_reply(&envelope::encode_reply(&reply).unwrap()).unwrap();
            prop_assert_eq!(decoded.success, reply.error.is_empty());
            prop_assert_eq!(decoded, reply);
        }
    }
}
