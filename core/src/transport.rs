//! Publish/subscribe transport abstraction.
//!
//! The bridge publishes request envelopes to a service topic and consumes
//! reply envelopes from reply topics. This module provides the [`Transport`]
//! trait both sides go through; the bridge itself never touches a Kafka client
//! directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  publish(request)   ┌─────────────────┐
//! │  Dispatcher  │────────────────────►│  service topic  │──► backend service
//! └──────▲───────┘                     └─────────────────┘          │
//!        │ resolve                                                  │ reply
//! ┌──────┴───────┐  subscribe(reply)   ┌─────────────────┐          │
//! │Reply Listener│◄────────────────────│   reply topic   │◄─────────┘
//! └──────────────┘                     └─────────────────┘
//! ```
//!
//! # Implementations
//!
//! - `InMemoryTransport` (in `kafka-bridge-testing`) - for tests
//! - `RedpandaTransport` (in `kafka-bridge-redpanda`) - Kafka-compatible brokers
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_bridge_core::transport::Transport;
//! use futures::StreamExt;
//!
//! async fn example(transport: impl Transport) -> Result<(), TransportError> {
//!     transport.publish("api-gateway-topic", b"user-login", b"{...}").await?;
//!
//!     let mut stream = transport.subscribe(&["user-service-topic"]).await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(message) => println!("{} bytes on {}", message.payload.len(), message.topic),
//!             Err(e) => eprintln!("Error: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to connect to the brokers
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be read
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// Topic the message was received on.
    pub topic: String,
    /// Message key, if any.
    pub key: Option<Vec<u8>>,
    /// Raw message value.
    pub payload: Vec<u8>,
}

/// Stream of messages from a subscription.
///
/// `Err` items are per-message failures; the stream ending means the
/// underlying channel is gone.
pub type MessageStream =
    Pin<Box<dyn Stream<Item = Result<TransportMessage, TransportError>> + Send>>;

/// Trait for publish/subscribe transports.
///
/// Implementations must be safe for concurrent use by many publishers.
///
/// # Dyn Compatibility
///
/// The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` so the bridge can hold it as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Publish a message to a topic.
    ///
    /// The call is bounded by the implementation's own send timeout; it is
    /// never retried.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PublishFailed`] if the broker rejects or times
    /// out the message.
    fn publish(
        &self,
        topic: &str,
        key: &[u8],
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SubscriptionFailed`] if the subscription
    /// cannot be established.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, TransportError>> + Send + '_>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn publish(
        &self,
        topic: &str,
        key: &[u8],
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        (**self).publish(topic, key, payload)
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, TransportError>> + Send + '_>> {
        (**self).subscribe(topics)
    }
}
