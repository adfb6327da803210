//! Redpanda transport for the Kafka request/reply bridge.
//!
//! This crate provides a Kafka-compatible implementation of the
//! [`Transport`] trait from `kafka-bridge-core`, built on rdkafka.
//!
//! # Why Redpanda?
//!
//! - **Kafka-compatible**: Uses standard Kafka protocol, works with any Kafka-compatible system
//! - **Vendor swappable**: Can use Redpanda, Apache Kafka, AWS MSK, Azure Event Hubs, etc.
//!
//! # Message Flow
//!
//! ```text
//! ┌──────────────┐  request envelope   ┌───────────────────┐
//! │  Dispatcher  │────────────────────►│ api-gateway-topic │──► services
//! └──────▲───────┘                     └───────────────────┘       │
//!        │                                                          │
//! ┌──────┴───────┐   reply envelope    ┌────────────────────┐       │
//! │Reply Listener│◄────────────────────│ user-service-topic │◄──────┘
//! └──────────────┘                     └────────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed AFTER the message reaches the subscriber's channel
//! - If the process crashes before commit, messages will be redelivered
//! - Redelivered replies are harmless: the bridge drops replies whose waiter
//!   is gone or already answered
//! - Ordering is guaranteed within the same partition (same message key)
//!
//! **Configuration options**:
//! - `consumer_group`: Consumer group shared by the reply listeners
//! - `buffer_size`: Message buffer (default: 1000) for handling bursts
//! - `auto_offset_reset`: Where to start reading (default: "latest")
//!
//! # Example
//!
//! ```no_run
//! use kafka_bridge_core::Transport;
//! use kafka_bridge_redpanda::RedpandaTransport;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = RedpandaTransport::new("localhost:9092")?;
//!
//! transport.publish("api-gateway-topic", b"user-login", b"{}").await?;
//!
//! let mut stream = transport.subscribe(&["user-service-topic"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => println!("Received {} bytes", message.payload.len()),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::{Stream, StreamExt};
use kafka_bridge_core::{MessageStream, Transport, TransportError, TransportMessage};
use kafka_bridge_runtime::BridgeConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;

/// Redpanda transport.
///
/// Publishes through one shared rdkafka producer; every subscription gets its
/// own consumer, owned by a forwarding task.
///
/// # Example
///
/// ```no_run
/// use kafka_bridge_redpanda::RedpandaTransport;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Basic configuration
/// let transport = RedpandaTransport::new("localhost:9092")?;
///
/// // Custom configuration
/// let transport = RedpandaTransport::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")  // Wait for all replicas
///     .consumer_group("api-gateway-group")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaTransport {
    /// Kafka producer for publishing requests
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Message buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaTransport {
    /// Create a new Redpanda transport with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, TransportError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a transport from bridge configuration: brokers, consumer group
    /// and publish timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, TransportError> {
        Self::builder()
            .brokers(&config.brokers)
            .consumer_group(&config.consumer_group)
            .timeout(config.publish_timeout)
            .build()
    }

    /// Create a new builder for configuring the transport.
    #[must_use]
    pub fn builder() -> RedpandaTransportBuilder {
        RedpandaTransportBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaTransport`].
#[derive(Default)]
pub struct RedpandaTransportBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaTransportBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// # Parameters
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "1"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// # Parameters
    ///
    /// - `compression`: "none", "gzip", "snappy", "lz4", "zstd"
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the bound on a single publish.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// If not set, the group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the message buffer size for subscriptions.
    ///
    /// Zero is treated as one.
    ///
    /// Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set the auto offset reset policy for new consumer groups.
    ///
    /// - `"earliest"`: Start from the beginning of the topic
    /// - `"latest"`: Start from the end (only new messages)
    /// - `"error"`: Throw error if no offset exists
    ///
    /// Default: "latest", since replies to requests issued before startup
    /// have no waiter.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaTransport, TransportError> {
        let brokers = self
            .brokers
            .ok_or_else(|| TransportError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set("compression.type", self.compression.as_deref().unwrap_or("none"));

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            consumer_group = self.consumer_group.as_deref().unwrap_or("<derived>"),
            buffer_size = self.buffer_size.unwrap_or(1000),
            auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("latest"),
            "RedpandaTransport created successfully"
        );

        Ok(RedpandaTransport {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "latest".to_string()),
        })
    }
}

impl Transport for RedpandaTransport {
    fn publish(
        &self,
        topic: &str,
        key: &[u8],
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_vec();
        let payload = payload.to_vec();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::to(&topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        bytes = payload.len(),
                        "Message published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(TransportError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, TransportError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let consumer_group = self.consumer_group.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consumer_group_id = consumer_group.unwrap_or_else(|| derived_group(&topics));

            // Manual commit for at-least-once delivery
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| TransportError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| TransportError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size = buffer_size,
                auto_offset_reset = %auto_offset_reset,
                manual_commit = true,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the consumer and forwards messages until the
            // receiver is dropped, even while no message is arriving.
            tokio::spawn(async move {
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(msg_result) = next_unless_closed(&mut stream, &tx).await {
                    match msg_result {
                        Ok(message) => {
                            let item = message.payload().map_or_else(
                                || {
                                    Err(TransportError::ReceiveFailed(
                                        "Message has no payload".to_string(),
                                    ))
                                },
                                |payload| {
                                    tracing::trace!(
                                        topic = message.topic(),
                                        partition = message.partition(),
                                        offset = message.offset(),
                                        "Received message"
                                    );
                                    Ok(TransportMessage {
                                        topic: message.topic().to_string(),
                                        key: message.key().map(<[u8]>::to_vec),
                                        payload: payload.to_vec(),
                                    })
                                },
                            );

                            // Only commit AFTER successful send to channel
                            if tx.send(item).await.is_err() {
                                tracing::debug!("Channel receiver dropped, exiting consumer task");
                                break;
                            }

                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        },
                        Err(e) => {
                            let err = TransportError::ReceiveFailed(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        },
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

/// Next item of `stream`, or `None` once it ends or `tx`'s receiver is gone.
async fn next_unless_closed<S, T>(stream: &mut S, tx: &mpsc::Sender<T>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::select! {
        biased;
        () = tx.closed() => {
            tracing::debug!("Channel receiver dropped, exiting consumer task");
            None
        }
        next = stream.next() => next,
    }
}

/// Consumer group used when none is configured: stable for a topic set.
fn derived_group(topics: &[String]) -> String {
    let mut sorted = topics.to_vec();
    sorted.sort();
    format!("kafka-bridge-{}", sorted.join("-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_transport_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaTransport>();
        assert_sync::<RedpandaTransport>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaTransport::builder().build();
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[test]
    fn derived_group_ignores_topic_order() {
        let a = derived_group(&["b-topic".to_string(), "a-topic".to_string()]);
        let b = derived_group(&["a-topic".to_string(), "b-topic".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a, "kafka-bridge-a-topic-b-topic");
    }

    #[tokio::test]
    async fn forwarding_stops_when_receiver_drops_on_idle_stream() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let mut idle = futures::stream::pending::<u32>();
        drop(rx);

        let next = tokio::time::timeout(
            Duration::from_secs(1),
            next_unless_closed(&mut idle, &tx),
        )
        .await;

        assert_eq!(next, Ok(None));
    }

    #[tokio::test]
    async fn forwarding_yields_items_while_receiver_lives() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let mut items = futures::stream::iter([7, 8]);

        assert_eq!(next_unless_closed(&mut items, &tx).await, Some(7));
        assert_eq!(next_unless_closed(&mut items, &tx).await, Some(8));
        assert_eq!(next_unless_closed(&mut items, &tx).await, None);
    }
}
