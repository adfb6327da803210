//! Application state for Axum handlers.

use kafka_bridge_runtime::{
    Bridge, BridgeConfig, Dispatcher, FanoutCoordinator, HealthTarget, OutboundRequest,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// State shared across all HTTP handlers.
///
/// Holds handles into a running [`Bridge`]; cloning is cheap. The bridge
/// itself stays with the caller so it can be shut down after the server
/// stops.
///
/// # Examples
///
/// ```ignore
/// let bridge = Bridge::start(transport, &config).await?;
/// let state = AppState::from_bridge(&bridge, &config);
/// let app = kafka_bridge_web::router(state.clone());
/// ```
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    fanout: FanoutCoordinator,
    request_topic: Arc<str>,
    health_targets: Arc<[HealthTarget]>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state over `bridge`, checking `health_targets` on `/health/services`.
    #[must_use]
    pub fn new(bridge: &Bridge, request_topic: &str, health_targets: Vec<HealthTarget>) -> Self {
        Self {
            dispatcher: Arc::clone(bridge.dispatcher()),
            fanout: bridge.fanout().clone(),
            request_topic: Arc::from(request_topic),
            health_targets: Arc::from(health_targets),
            metrics: None,
        }
    }

    /// Serve `handle` on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build state over `bridge` for the services named in `config`.
    #[must_use]
    pub fn from_bridge(bridge: &Bridge, config: &BridgeConfig) -> Self {
        Self::new(bridge, &config.request_topic, config.health_targets())
    }

    /// Dispatcher for bridged requests.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Fanout coordinator for multi-service requests.
    #[must_use]
    pub const fn fanout(&self) -> &FanoutCoordinator {
        &self.fanout
    }

    /// Services checked by the health endpoint.
    #[must_use]
    pub fn health_targets(&self) -> &[HealthTarget] {
        &self.health_targets
    }

    /// Prometheus handle behind `/metrics`, if one was attached.
    #[must_use]
    pub const fn metrics(&self) -> Option<&PrometheusHandle> {
        self.metrics.as_ref()
    }

    /// Start a request on the bridge's request topic.
    #[must_use]
    pub fn request(
        &self,
        request_type: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> OutboundRequest {
        OutboundRequest::new(request_type, &*self.request_topic, reply_to)
    }
}
