//! In-memory publish/subscribe transport.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Locks only panic if a test already panicked

use kafka_bridge_core::{MessageStream, Transport, TransportError, TransportMessage};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Subscriber = mpsc::UnboundedSender<Result<TransportMessage, TransportError>>;

#[derive(Default)]
struct Inner {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    published: Mutex<Vec<TransportMessage>>,
    fail_publishes: AtomicBool,
}

/// In-memory transport for fast, deterministic tests.
///
/// Every message published to a topic is delivered to every current
/// subscriber of that topic, in publish order. Clones share the same topics.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use kafka_bridge_core::Transport;
/// use kafka_bridge_testing::InMemoryTransport;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = InMemoryTransport::new();
/// let mut replies = transport.subscribe(&["user-service-topic"]).await?;
///
/// transport.publish("user-service-topic", b"key", b"{}").await?;
///
/// let message = replies.next().await.unwrap()?;
/// assert_eq!(message.payload, b"{}");
/// assert_eq!(transport.published_to("user-service-topic").len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl InMemoryTransport {
    /// Create a transport with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Deliver raw bytes to the subscribers of `topic` without recording a
    /// publish, as if another producer had written them.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.deliver(&TransportMessage {
            topic: topic.to_string(),
            key: None,
            payload: payload.into(),
        });
    }

    /// Deliver a receive error to the subscribers of `topic`.
    pub fn inject_error(&self, topic: &str, error: TransportError) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        if let Some(senders) = subscribers.get_mut(topic) {
            senders.retain(|tx| tx.send(Err(error.clone())).is_ok());
        }
    }

    /// Drop every subscription to `topic`, ending their streams.
    pub fn disconnect(&self, topic: &str) {
        self.inner.subscribers.lock().unwrap().remove(topic);
    }

    /// Number of live subscriptions to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Every message published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<TransportMessage> {
        self.inner.published.lock().unwrap().clone()
    }

    /// Messages published to `topic`, in order.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<TransportMessage> {
        self.inner
            .published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Forget recorded publishes (for test isolation).
    pub fn clear(&self) {
        self.inner.published.lock().unwrap().clear();
    }

    fn deliver(&self, message: &TransportMessage) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        if let Some(senders) = subscribers.get_mut(&message.topic) {
            senders.retain(|tx| tx.send(Ok(message.clone())).is_ok());
        }
    }
}

impl Transport for InMemoryTransport {
    fn publish(
        &self,
        topic: &str,
        key: &[u8],
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let result = if self.inner.fail_publishes.load(Ordering::SeqCst) {
            Err(TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: "publish failure injected".to_string(),
            })
        } else {
            let message = TransportMessage {
                topic: topic.to_string(),
                key: Some(key.to_vec()),
                payload: payload.to_vec(),
            };
            self.inner.published.lock().unwrap().push(message.clone());
            self.deliver(&message);
            Ok(())
        };

        Box::pin(async move { result })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, TransportError>> + Send + '_>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut subscribers = self.inner.subscribers.lock().unwrap();
            for topic in topics {
                subscribers
                    .entry((*topic).to_string())
                    .or_default()
                    .push(tx.clone());
            }
        }

        Box::pin(async move {
            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_fans_out_to_every_subscriber() {
        let transport = InMemoryTransport::new();
        let mut first = transport.subscribe(&["replies"]).await.unwrap();
        let mut second = transport.subscribe(&["replies", "other"]).await.unwrap();
        assert_eq!(transport.subscriber_count("replies"), 2);

        transport.publish("replies", b"k", b"one").await.unwrap();
        transport.publish("other", b"k", b"two").await.unwrap();

        assert_eq!(first.next().await.unwrap().unwrap().payload, b"one");
        assert_eq!(second.next().await.unwrap().unwrap().payload, b"one");
        let other = second.next().await.unwrap().unwrap();
        assert_eq!(other.topic, "other");
        assert_eq!(other.key.as_deref(), Some(&b"k"[..]));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let transport = InMemoryTransport::new();
        transport.fail_publishes(true);

        let result = transport.publish("requests", b"k", b"{}").await;
        assert!(matches!(result, Err(TransportError::PublishFailed { .. })));
        assert!(transport.published().is_empty());

        transport.fail_publishes(false);
        transport.publish("requests", b"k", b"{}").await.unwrap();
        assert_eq!(transport.published_to("requests").len(), 1);
    }

    #[tokio::test]
    async fn test_inject_and_disconnect() {
        let transport = InMemoryTransport::new();
        let mut stream = transport.subscribe(&["replies"]).await.unwrap();

        transport.inject("replies", b"raw".to_vec());
        transport.inject_error("replies", TransportError::ReceiveFailed("eof".to_string()));
        transport.disconnect("replies");

        assert_eq!(stream.next().await.unwrap().unwrap().payload, b"raw");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(transport.published().is_empty());
    }
}
