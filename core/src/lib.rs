//! # Kafka Bridge Core
//!
//! Wire types and boundaries for bridging synchronous request/response callers
//! to a topic-based publish/subscribe transport.
//!
//! ## Contents
//!
//! - [`envelope`]: request and reply envelopes and their JSON codec
//! - [`correlation`]: the token pairing a request with its reply
//! - [`transport`]: the publish/subscribe trait implemented by brokers
//! - [`error`]: caller-facing failure taxonomy
//! - [`auth`]: the bearer-token validation boundary
//!
//! ## Example
//!
//! ```
//! use kafka_bridge_core::{CorrelationId, ReplyEnvelope, envelope};
//!
//! let id = CorrelationId::new();
//! let bytes = envelope::encode_reply(&ReplyEnvelope::failure(id, "user not found"))?;
//! let reply = envelope::decode_reply(&bytes)?;
//! assert!(!reply.success);
//! # Ok::<(), kafka_bridge_core::CodecError>(())
//! ```

pub mod auth;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod transport;

// Re-export commonly used types
pub use auth::{AuthGate, AuthGateError, TokenClaims};
pub use correlation::CorrelationId;
pub use envelope::{CodecError, ReplyEnvelope, RequestEnvelope};
pub use error::{BridgeError, BridgeErrorKind};
pub use transport::{MessageStream, Transport, TransportError, TransportMessage};
