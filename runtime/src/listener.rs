//! Reply listeners.
//!
//! One listener per reply topic. Each consumes reply envelopes for the
//! lifetime of the process and hands them to the shared
//! [`CorrelationRegistry`]. Bad messages are logged and skipped; nothing a
//! single message contains can stop the loop.

use crate::metrics::BridgeMetrics;
use crate::registry::CorrelationRegistry;
use futures::StreamExt;
use kafka_bridge_core::envelope;
use kafka_bridge_core::{MessageStream, Transport, TransportError, TransportMessage};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a listener loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// Shutdown was requested.
    Shutdown,
    /// The subscription stream ended.
    StreamEnded,
    /// The listener task panicked or was aborted.
    Panicked(String),
}

/// Starts reply listeners.
pub struct ReplyListener;

impl ReplyListener {
    /// Subscribe to `topic` and spawn the consume loop.
    ///
    /// The subscription is established before this returns, so replies
    /// published afterwards are not missed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the subscription cannot be established.
    pub async fn start(
        transport: Arc<dyn Transport>,
        registry: Arc<CorrelationRegistry>,
        topic: impl Into<String>,
    ) -> Result<ListenerHandle, TransportError> {
        let topic = topic.into();
        let stream = transport.subscribe(&[topic.as_str()]).await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(topic = %topic, "Reply listener started");
        let task = tokio::spawn(run(stream, registry, topic.clone(), shutdown_rx));

        Ok(ListenerHandle {
            topic,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a running listener.
///
/// Dropping the handle also stops the loop.
pub struct ListenerHandle {
    topic: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<ListenerExit>,
}

impl ListenerHandle {
    /// Topic this listener consumes.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the loop has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop after the message it is handling.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Stop the loop and wait for it to finish.
    pub async fn join(mut self) -> ListenerExit {
        self.shutdown();
        match (&mut self.task).await {
            Ok(exit) => exit,
            Err(e) => ListenerExit::Panicked(e.to_string()),
        }
    }
}

async fn run(
    mut stream: MessageStream,
    registry: Arc<CorrelationRegistry>,
    topic: String,
    mut shutdown: oneshot::Receiver<()>,
) -> ListenerExit {
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!(topic = %topic, "Reply listener shutting down");
                return ListenerExit::Shutdown;
            }

            next = stream.next() => match next {
                Some(Ok(message)) => handle_message(&registry, &message),
                Some(Err(e)) => {
                    BridgeMetrics::record_receive_error();
                    warn!(topic = %topic, error = %e, "Failed to receive reply");
                }
                None => {
                    error!(topic = %topic, "Reply stream ended");
                    return ListenerExit::StreamEnded;
                }
            },
        }
    }
}

fn handle_message(registry: &CorrelationRegistry, message: &TransportMessage) {
    let reply = match envelope::decode_reply(&message.payload) {
        Ok(reply) => reply,
        Err(e) => {
            BridgeMetrics::record_decode_error();
            warn!(topic = %message.topic, error = %e, "Skipping undecodable reply");
            return;
        }
    };

    BridgeMetrics::record_reply();
    let id = reply.correlation_id;
    let success = reply.success;
    let delivered = registry.resolve(&id, reply);
    debug!(
        topic = %message.topic,
        correlation_id = %id,
        success,
        delivered,
        "Handled reply"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::stream;
    use kafka_bridge_core::{CorrelationId, ReplyEnvelope};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Transport whose single subscription is fed from a channel.
    struct ChannelTransport {
        rx: Mutex<Option<mpsc::UnboundedReceiver<Result<TransportMessage, TransportError>>>>,
    }

    impl ChannelTransport {
        fn new() -> (
            Arc<Self>,
            mpsc::UnboundedSender<Result<TransportMessage, TransportError>>,
        ) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    rx: Mutex::new(Some(rx)),
                }),
                tx,
            )
        }
    }

    impl Transport for ChannelTransport {
        fn publish(
            &self,
            _topic: &str,
            _key: &[u8],
            _payload: &[u8],
        ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn subscribe(
            &self,
            _topics: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<MessageStream, TransportError>> + Send + '_>>
        {
            let rx = self.rx.lock().unwrap().take();
            Box::pin(async move {
                let rx = rx.ok_or_else(|| TransportError::SubscriptionFailed {
                    topics: vec![],
                    reason: "already subscribed".to_string(),
                })?;
                let stream = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(Box::pin(stream) as MessageStream)
            })
        }
    }

    fn message(payload: Vec<u8>) -> TransportMessage {
        TransportMessage {
            topic: "user-service-topic".to_string(),
            key: None,
            payload,
        }
    }

    #[tokio::test]
    async fn test_delivers_replies_and_survives_bad_messages() {
        let (transport, tx) = ChannelTransport::new();
        let registry = Arc::new(CorrelationRegistry::new());
        let handle = ReplyListener::start(transport, Arc::clone(&registry), "user-service-topic")
            .await
            .unwrap();

        let id = CorrelationId::new();
        let mut registration = registry.register(id, "login").unwrap();

        tx.send(Ok(message(b"not json".to_vec()))).unwrap();
        tx.send(Err(TransportError::ReceiveFailed("partition eof".to_string())))
            .unwrap();
        let reply = ReplyEnvelope::success(id, r#"{"token":"abc"}"#);
        tx.send(Ok(message(envelope::encode_reply(&reply).unwrap())))
            .unwrap();

        let received = registration.wait().await.unwrap();
        assert_eq!(received, reply);
        assert!(!handle.is_finished());
        assert_eq!(handle.join().await, ListenerExit::Shutdown);
    }

    #[tokio::test]
    async fn test_stream_end_stops_listener() {
        let (transport, tx) = ChannelTransport::new();
        let registry = Arc::new(CorrelationRegistry::new());
        let handle = ReplyListener::start(transport, registry, "product-service-topic")
            .await
            .unwrap();
        assert_eq!(handle.topic(), "product-service-topic");

        drop(tx);
        // `join` requests shutdown too; a closed stream may win either way.
        let exit = handle.join().await;
        assert!(matches!(exit, ListenerExit::StreamEnded | ListenerExit::Shutdown));
    }

    #[tokio::test]
    async fn test_failed_subscription_is_reported() {
        let (transport, _tx) = ChannelTransport::new();
        let registry = Arc::new(CorrelationRegistry::new());
        let _first = ReplyListener::start(transport.clone(), Arc::clone(&registry), "a")
            .await
            .unwrap();

        let second = ReplyListener::start(transport, registry, "a").await;
        assert!(matches!(
            second,
            Err(TransportError::SubscriptionFailed { .. })
        ));
    }
}
