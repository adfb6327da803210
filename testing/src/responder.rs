//! Scripted backend service.
//!
//! [`EchoResponder`] plays the part of a backend service: it consumes request
//! envelopes from a topic and publishes whatever its handler returns to the
//! request's `reply_to` topic.

use futures::StreamExt;
use kafka_bridge_core::envelope::{self, RequestEnvelope};
use kafka_bridge_core::{ReplyEnvelope, Transport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Handler = dyn Fn(&RequestEnvelope) -> Option<ReplyEnvelope> + Send + Sync;

/// A responder subscribed to a request topic.
///
/// Each request is answered on its own task, so a delayed reply never holds
/// up the next request. Dropping the responder stops it.
///
/// # Example
///
/// ```ignore
/// let responder = EchoResponder::builder(|request| {
///     (request.request_type == "login")
///         .then(|| ReplyEnvelope::success(request.correlation_id, r#"{"token":"abc"}"#))
/// })
/// .with_delay(Duration::from_millis(50))
/// .spawn(transport.clone(), "api-gateway-topic")
/// .await?;
/// ```
pub struct EchoResponder {
    task: JoinHandle<()>,
    handled: Arc<AtomicUsize>,
}

/// Configures an [`EchoResponder`] before it subscribes.
pub struct EchoResponderBuilder {
    handler: Arc<Handler>,
    delay: Duration,
}

impl EchoResponderBuilder {
    /// Wait `delay` before publishing each reply.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Subscribe to `request_topic` and start answering.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the subscription fails.
    pub async fn spawn<T>(
        self,
        transport: T,
        request_topic: &str,
    ) -> Result<EchoResponder, TransportError>
    where
        T: Transport + Clone + 'static,
    {
        let mut requests = transport.subscribe(&[request_topic]).await?;
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let Self { handler, delay } = self;

        let task = tokio::spawn(async move {
            while let Some(item) = requests.next().await {
                let Ok(message) = item else { continue };
                let request = match envelope::decode_request(&message.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "Responder skipping undecodable request");
                        continue;
                    }
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let Some(reply) = handler(&request) else {
                    debug!(correlation_id = %request.correlation_id, "Responder ignoring request");
                    continue;
                };

                let transport = transport.clone();
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let Ok(bytes) = envelope::encode_reply(&reply) else {
                        return;
                    };
                    let key = reply.correlation_id.to_string();
                    if let Err(e) = transport
                        .publish(&request.reply_to, key.as_bytes(), &bytes)
                        .await
                    {
                        warn!(error = %e, "Responder failed to publish reply");
                    }
                });
            }
        });

        Ok(EchoResponder { task, handled })
    }
}

impl EchoResponder {
    /// Start configuring a responder that answers with `handler`.
    ///
    /// Returning `None` leaves the request unanswered.
    pub fn builder<F>(handler: F) -> EchoResponderBuilder
    where
        F: Fn(&RequestEnvelope) -> Option<ReplyEnvelope> + Send + Sync + 'static,
    {
        EchoResponderBuilder {
            handler: Arc::new(handler),
            delay: Duration::ZERO,
        }
    }

    /// Responder that answers every request with its own payload.
    pub fn echo() -> EchoResponderBuilder {
        Self::builder(|request| {
            Some(ReplyEnvelope::success(
                request.correlation_id,
                request.payload.clone(),
            ))
        })
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }

    /// Stop answering.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for EchoResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::InMemoryTransport;
    use kafka_bridge_core::CorrelationId;

    #[tokio::test]
    async fn test_echo_replies_to_reply_topic() {
        let transport = InMemoryTransport::new();
        let responder = EchoResponder::echo()
            .spawn(transport.clone(), "requests")
            .await
            .unwrap();
        let mut replies = transport.subscribe(&["replies"]).await.unwrap();

        let id = CorrelationId::new();
        let request = envelope::encode_request("ping", id, "replies", "hello").unwrap();
        transport.publish("requests", b"ping", &request).await.unwrap();

        let message = replies.next().await.unwrap().unwrap();
        let reply = envelope::decode_reply(&message.payload).unwrap();
        assert_eq!(reply, ReplyEnvelope::success(id, "hello"));
        assert_eq!(message.key.unwrap(), id.to_string().into_bytes());
        assert_eq!(responder.handled(), 1);
    }

    #[tokio::test]
    async fn test_none_leaves_request_unanswered() {
        let transport = InMemoryTransport::new();
        let responder = EchoResponder::builder(|_| None)
            .spawn(transport.clone(), "requests")
            .await
            .unwrap();

        let request =
            envelope::encode_request("ping", CorrelationId::new(), "replies", "").unwrap();
        transport.publish("requests", b"ping", &request).await.unwrap();
        transport.inject("requests", b"garbage".to_vec());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(responder.handled(), 1);
        assert!(transport.published_to("replies").is_empty());
    }
}
