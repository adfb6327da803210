//! Composition root.
//!
//! [`Bridge`] owns the process-wide [`CorrelationRegistry`], starts one reply
//! listener per reply topic and hands out the dispatcher and fanout
//! coordinator built around them.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = BridgeConfig::from_env()?;
//! let transport = Arc::new(RedpandaTransport::from_config(&config)?);
//! let bridge = Bridge::start(transport, &config).await?;
//!
//! let request = bridge.request("login", "user-service-topic").with_key("user-login");
//! let reply = bridge.dispatcher().send(request).await?;
//! ```

use crate::config::BridgeConfig;
use crate::dispatcher::{Dispatcher, OutboundRequest};
use crate::fanout::FanoutCoordinator;
use crate::listener::{ListenerExit, ListenerHandle, ReplyListener};
use crate::registry::CorrelationRegistry;
use kafka_bridge_core::{Transport, TransportError};
use std::sync::Arc;
use tracing::info;

/// A running bridge.
pub struct Bridge {
    registry: Arc<CorrelationRegistry>,
    dispatcher: Arc<Dispatcher>,
    fanout: FanoutCoordinator,
    listeners: Vec<ListenerHandle>,
    request_topic: String,
}

impl Bridge {
    /// Start listeners for every reply topic in `config` and build the
    /// dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if any reply topic cannot be subscribed.
    /// Listeners already started are stopped.
    pub async fn start(
        transport: Arc<dyn Transport>,
        config: &BridgeConfig,
    ) -> Result<Self, TransportError> {
        let registry = Arc::new(CorrelationRegistry::new());

        let mut listeners = Vec::with_capacity(config.reply_topics.len());
        for topic in &config.reply_topics {
            match ReplyListener::start(Arc::clone(&transport), Arc::clone(&registry), topic).await
            {
                Ok(handle) => listeners.push(handle),
                Err(e) => {
                    for handle in listeners {
                        handle.join().await;
                    }
                    return Err(e);
                }
            }
        }

        let dispatcher = Arc::new(
            Dispatcher::new(transport, Arc::clone(&registry))
                .with_default_timeout(config.default_timeout),
        );
        let fanout = FanoutCoordinator::new(Arc::clone(&dispatcher));

        info!(
            request_topic = %config.request_topic,
            reply_topics = ?config.reply_topics,
            "Bridge started"
        );

        Ok(Self {
            registry,
            dispatcher,
            fanout,
            listeners,
            request_topic: config.request_topic.clone(),
        })
    }

    /// Shared dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Fanout coordinator over the shared dispatcher.
    #[must_use]
    pub const fn fanout(&self) -> &FanoutCoordinator {
        &self.fanout
    }

    /// The process-wide registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// A request addressed to the configured request topic.
    #[must_use]
    pub fn request(
        &self,
        request_type: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> OutboundRequest {
        OutboundRequest::new(request_type, &self.request_topic, reply_to)
    }

    /// Topics with a listener.
    pub fn listener_topics(&self) -> impl Iterator<Item = &str> {
        self.listeners.iter().map(ListenerHandle::topic)
    }

    /// Stop every listener and report how each exited.
    pub async fn shutdown(self) -> Vec<(String, ListenerExit)> {
        let mut exits = Vec::with_capacity(self.listeners.len());
        for handle in self.listeners {
            let topic = handle.topic().to_string();
            exits.push((topic, handle.join().await));
        }
        info!("Bridge stopped");
        exits
    }
}
