//! Wire envelopes exchanged with backend services.
//!
//! Requests and replies travel as JSON objects. The `payload` of a request and
//! the `data` of a reply are themselves serialized structures carried as
//! strings; the bridge never interprets them.
//!
//! ```text
//! request: {"type": "login", "correlation_id": "...", "reply_to": "user-service-topic", "payload": "{...}"}
//! reply:   {"correlation_id": "...", "success": true, "data": "{...}"}
//! reply:   {"correlation_id": "...", "success": false, "data": "", "error": "invalid credentials"}
//! ```
//!
//! # Example
//!
//! ```
//! use kafka_bridge_core::correlation::CorrelationId;
//! use kafka_bridge_core::envelope::{self, ReplyEnvelope};
//!
//! let id = CorrelationId::new();
//! let bytes = envelope::encode_request("login", id, "user-service-topic", "{}")?;
//! let request = envelope::decode_request(&bytes)?;
//! assert_eq!(request.correlation_id, id);
//!
//! let reply = ReplyEnvelope::success(id, r#"{"token":"abc"}"#);
//! let decoded = envelope::decode_reply(&envelope::encode_reply(&reply)?)?;
//! assert_eq!(decoded, reply);
//! # Ok::<(), kafka_bridge_core::envelope::CodecError>(())
//! ```

use crate::correlation::CorrelationId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors raised while encoding or decoding envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bytes were not a well-formed envelope.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// A value could not be serialized.
    #[error("Failed to encode {what}: {reason}")]
    Encode {
        /// What was being encoded
        what: &'static str,
        /// Serializer message
        reason: String,
    },

    /// Reply data did not match the expected shape.
    #[error("Unexpected reply data: {0}")]
    UnexpectedData(String),
}

/// Request envelope published to a backend service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Logical operation, e.g. `"login"` or `"get-product-by-id"`.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Token the responder must copy into its reply.
    pub correlation_id: CorrelationId,
    /// Topic the responder publishes its reply to.
    pub reply_to: String,
    /// Serialized request body.
    pub payload: String,
}

impl RequestEnvelope {
    /// Encode to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Encode {
            what: "request envelope",
            reason: e.to_string(),
        })
    }
}

/// Reply envelope published by a backend service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Token copied from the originating request.
    pub correlation_id: CorrelationId,
    /// `false` signals a business-level rejection, not a transport failure.
    pub success: bool,
    /// Serialized success payload.
    #[serde(default)]
    pub data: String,
    /// Failure reason, empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ReplyEnvelope {
    /// Build a successful reply.
    #[must_use]
    pub fn success(correlation_id: CorrelationId, data: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: true,
            data: data.into(),
            error: String::new(),
        }
    }

    /// Build a failed reply.
    #[must_use]
    pub fn failure(correlation_id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: false,
            data: String::new(),
            error: error.into(),
        }
    }

    /// Deserialize `data` as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedData`] if `data` is not a valid `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_str(&self.data).map_err(|e| CodecError::UnexpectedData(e.to_string()))
    }
}

/// Serialize a request body into the opaque `payload` string.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if `value` cannot be serialized.
pub fn payload_from<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Encode {
        what: "payload",
        reason: e.to_string(),
    })
}

/// Encode a request envelope.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_request(
    request_type: &str,
    correlation_id: CorrelationId,
    reply_to: &str,
    payload: &str,
) -> Result<Vec<u8>, CodecError> {
    RequestEnvelope {
        request_type: request_type.to_string(),
        correlation_id,
        reply_to: reply_to.to_string(),
        payload: payload.to_string(),
    }
    .encode()
}

/// Decode a request envelope (responder side).
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a request envelope.
pub fn decode_request(bytes: &[u8]) -> Result<RequestEnvelope, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Encode a reply envelope (responder side).
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_reply(reply: &ReplyEnvelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(reply).map_err(|e| CodecError::Encode {
        what: "reply envelope",
        reason: e.to_string(),
    })
}

/// Decode a reply envelope.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a reply envelope.
/// Listeners treat this as a per-message failure.
pub fn decode_reply(bytes: &[u8]) -> Result<ReplyEnvelope, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_uses_go_field_names() {
        let id = CorrelationId::new();
        let bytes = encode_request("login", id, "user-service-topic", r#"{"email":"u@x.com"}"#).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "login");
        assert_eq!(value["correlation_id"], id.to_string());
        assert_eq!(value["reply_to"], "user-service-topic");
        assert_eq!(value["payload"], r#"{"email":"u@x.com"}"#);
    }

    #[test]
    fn success_reply_omits_empty_error() {
        let reply = ReplyEnvelope::success(CorrelationId::new(), "ok");
        let value: serde_json::Value = serde_json::from_slice(&encode_reply(&reply).unwrap()).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["success"], true);
    }

    #[test]
    fn reply_without_data_or_error_decodes() {
        let id = CorrelationId::new();
        let raw = format!(r#"{{"correlation_id":"{id}","success":false}}"#);
        let reply = decode_reply(raw.as_bytes()).unwrap();
        assert_eq!(reply.correlation_id, id);
        assert!(!reply.success);
        assert!(reply.data.is_empty());
        assert!(reply.error.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode_reply(b"not json"), Err(CodecError::Malformed(_))));
        assert!(matches!(
            decode_reply(br#"{"correlation_id":"nope","success":true}"#),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(decode_reply(br#"{"success":true}"#), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn data_as_parses_nested_json() {
        #[derive(Deserialize)]
        struct Login {
            token: String,
        }

        let reply = ReplyEnvelope::success(CorrelationId::new(), r#"{"token":"abc"}"#);
        let login: Login = reply.data_as().unwrap();
        assert_eq!(login.token, "abc");

        let not_json = ReplyEnvelope::success(CorrelationId::new(), "plain text");
        assert!(matches!(
            not_json.data_as::<Login>(),
            Err(CodecError::UnexpectedData(_))
        ));
    }

    // Not `kafka_bridge_testing::properties::arb_reply`: that crate depends
    // on this one, so its envelopes would be a distinct `ReplyEnvelope` type
    // here. This strategy also fills every field independently, including
    // successes that carry error text, which the codec must preserve as is.
    fn arb_raw_reply() -> impl Strategy<Value = ReplyEnvelope> {
        (any::<u128>(), any::<bool>(), ".*", ".*").prop_map(|(raw, success, data, error)| {
            ReplyEnvelope {
                correlation_id: CorrelationId::from(uuid::Uuid::from_u128(raw)),
                success,
                data,
                error,
            }
        })
    }

    proptest! {
        #[test]
        fn reply_round_trips(reply in arb_raw_reply()) {
            let bytes = encode_reply(&reply).unwrap();
            prop_assert_eq!(decode_reply(&bytes).unwrap(), reply);
        }
    }
}
