//! Caller-facing errors of the request/reply bridge.
//!
//! A reply with `success == false` is **not** an error here: it is the normal
//! channel for business-level rejections and is returned to the caller as a
//! reply. The variants below are the failures of the bridge itself.

use crate::correlation::CorrelationId;
use crate::envelope::CodecError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures of a single bridged request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Publishing the request failed; no reply will ever arrive.
    #[error("Failed to publish request: {0}")]
    Publish(#[source] TransportError),

    /// No reply arrived before the deadline.
    #[error("Timed out after {timeout:?} waiting for '{request_type}' reply ({correlation_id})")]
    Timeout {
        /// Correlation ID of the abandoned request
        correlation_id: CorrelationId,
        /// Logical operation that timed out
        request_type: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// The request body or envelope could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(#[source] CodecError),

    /// Reply data could not be decoded into the expected shape.
    #[error("Failed to decode reply: {0}")]
    Decode(#[source] CodecError),

    /// A waiter with this ID is already registered.
    #[error("Correlation ID {0} is already registered")]
    DuplicateCorrelationId(CorrelationId),

    /// The waiter's cell was dropped without a reply being delivered.
    #[error("Waiter for {0} was dropped before a reply arrived")]
    WaiterDropped(CorrelationId),
}

/// Coarse classification used by the HTTP edge to choose a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeErrorKind {
    /// The deadline elapsed.
    Timeout,
    /// The transport rejected the request.
    Transport,
    /// Encoding or decoding failed.
    Codec,
    /// An internal invariant was violated.
    Internal,
}

impl BridgeError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> BridgeErrorKind {
        match self {
            Self::Timeout { .. } => BridgeErrorKind::Timeout,
            Self::Publish(_) => BridgeErrorKind::Transport,
            Self::Encode(_) | Self::Decode(_) => BridgeErrorKind::Codec,
            Self::DuplicateCorrelationId(_) | Self::WaiterDropped(_) => BridgeErrorKind::Internal,
        }
    }

    /// Whether this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Publish(_) => "publish_error",
            Self::Timeout { .. } => "timeout",
            Self::Encode(_) => "encode_error",
            Self::Decode(_) => "decode_error",
            Self::DuplicateCorrelationId(_) => "duplicate_id",
            Self::WaiterDropped(_) => "waiter_dropped",
        }
    }
}
