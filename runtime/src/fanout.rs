//! Fanout coordinator: many dispatches, one ordered report.
//!
//! Every target is sent concurrently. One target's failure never cancels or
//! delays another, and there is no outer deadline beyond each request's own.

use crate::dispatcher::{Dispatcher, OutboundRequest, Reply};
use crate::health::{HealthCheck, HealthReport};
use futures::future::join_all;
use kafka_bridge_core::BridgeError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Request type every service answers for liveness.
pub const HEALTH_REQUEST_TYPE: &str = "health";

/// One request in a fanout, labelled with the service it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTarget {
    /// Service label reported back in the outcome.
    pub service: String,
    /// Request sent to the service.
    pub request: OutboundRequest,
}

impl FanoutTarget {
    /// Create a target.
    #[must_use]
    pub fn new(service: impl Into<String>, request: OutboundRequest) -> Self {
        Self {
            service: service.into(),
            request,
        }
    }
}

/// Outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutcome {
    /// Service label from the target.
    pub service: String,
    /// Reply or bridge failure.
    pub outcome: Result<Reply, BridgeError>,
}

impl ServiceOutcome {
    fn to_health_check(&self) -> HealthCheck {
        match &self.outcome {
            Ok(reply) if reply.is_success() => HealthCheck::healthy(&self.service)
                .with_metadata("correlation_id", reply.correlation_id().to_string())
                .with_metadata("latency_ms", reply.elapsed().as_millis().to_string()),
            Ok(reply) => HealthCheck::degraded(&self.service, reply.error())
                .with_metadata("correlation_id", reply.correlation_id().to_string()),
            Err(e) => HealthCheck::unhealthy(&self.service, e.to_string())
                .with_metadata("error", e.label()),
        }
    }
}

/// Ordered outcomes of a fanout, one per target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FanoutReport {
    outcomes: Vec<ServiceOutcome>,
}

impl FanoutReport {
    /// Number of outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the fanout had no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcomes in target order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceOutcome> {
        self.outcomes.iter()
    }

    /// Outcome for `service`.
    #[must_use]
    pub fn get(&self, service: &str) -> Option<&ServiceOutcome> {
        self.outcomes.iter().find(|o| o.service == service)
    }

    /// Number of targets that got a successful reply.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.outcome, Ok(reply) if reply.is_success()))
            .count()
    }

    /// Number of targets that got a domain failure or a bridge error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Render the outcomes as a health report.
    ///
    /// Successful reply: healthy. Domain failure: degraded. Bridge error:
    /// unhealthy.
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        HealthReport::new(
            self.outcomes
                .iter()
                .map(ServiceOutcome::to_health_check)
                .collect(),
        )
    }

    /// Consume the report, returning the outcomes.
    #[must_use]
    pub fn into_outcomes(self) -> Vec<ServiceOutcome> {
        self.outcomes
    }
}

impl IntoIterator for FanoutReport {
    type Item = ServiceOutcome;
    type IntoIter = std::vec::IntoIter<ServiceOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// A service checked by [`FanoutCoordinator::check_health`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTarget {
    /// Service label.
    pub service: String,
    /// Topic the health request is published to.
    pub topic: String,
    /// Topic the service replies on.
    pub reply_to: String,
    /// Deadline for this health request, or the dispatcher default.
    pub timeout: Option<Duration>,
}

impl HealthTarget {
    /// Create a health target.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        topic: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            topic: topic.into(),
            reply_to: reply_to.into(),
            timeout: None,
        }
    }

    /// Set the health request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn to_fanout_target(&self) -> FanoutTarget {
        let mut request = OutboundRequest::new(HEALTH_REQUEST_TYPE, &self.topic, &self.reply_to)
            .with_key(format!("{}-health", self.service));
        request.timeout = self.timeout;
        FanoutTarget::new(&self.service, request)
    }
}

/// Issues concurrent dispatches and gathers their outcomes.
#[derive(Clone)]
pub struct FanoutCoordinator {
    dispatcher: Arc<Dispatcher>,
}

impl FanoutCoordinator {
    /// Create a coordinator over `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Send every target concurrently and wait for all of them.
    ///
    /// The report preserves target order.
    #[tracing::instrument(skip_all, name = "bridge_fanout", fields(targets = targets.len()))]
    pub async fn gather_all(&self, targets: Vec<FanoutTarget>) -> FanoutReport {
        let calls = targets.into_iter().map(|target| {
            let dispatcher = Arc::clone(&self.dispatcher);
            async move {
                let outcome = dispatcher.send(target.request).await;
                ServiceOutcome {
                    service: target.service,
                    outcome,
                }
            }
        });

        let report = FanoutReport {
            outcomes: join_all(calls).await,
        };
        debug!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Fanout complete"
        );
        report
    }

    /// Send a `"health"` request to every service and fold the answers into
    /// a health report.
    pub async fn check_health(&self, services: &[HealthTarget]) -> HealthReport {
        let targets = services.iter().map(HealthTarget::to_fanout_target).collect();
        self.gather_all(targets).await.health_report()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use kafka_bridge_core::{CorrelationId, ReplyEnvelope, TransportError};

    fn reply(envelope: ReplyEnvelope) -> Reply {
        Reply::from_parts(envelope, Duration::from_millis(5))
    }

    #[test]
    fn test_health_mapping() {
        let id = CorrelationId::new();
        let report = FanoutReport {
            outcomes: vec![
                ServiceOutcome {
                    service: "user-service".to_string(),
                    outcome: Ok(reply(ReplyEnvelope::success(id, "ok"))),
                },
                ServiceOutcome {
                    service: "product-service".to_string(),
                    outcome: Ok(reply(ReplyEnvelope::failure(id, "database down"))),
                },
                ServiceOutcome {
                    service: "order-service".to_string(),
                    outcome: Err(BridgeError::Publish(TransportError::PublishFailed {
                        topic: "api-gateway-topic".to_string(),
                        reason: "broker unavailable".to_string(),
                    })),
                },
            ],
        };

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);

        let health = report.health_report();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        let statuses: Vec<_> = health.services.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                HealthStatus::Healthy,
                HealthStatus::Degraded,
                HealthStatus::Unhealthy
            ]
        );
        assert_eq!(
            health.check("product-service").unwrap().message.as_deref(),
            Some("database down")
        );
        assert_eq!(
            health.check("order-service").unwrap().metadata["error"],
            "publish_error"
        );
    }

    #[test]
    fn test_health_target_request() {
        let target = HealthTarget::new("user-service", "api-gateway-topic", "user-service-topic")
            .with_timeout(Duration::from_secs(2))
            .to_fanout_target();

        assert_eq!(target.service, "user-service");
        assert_eq!(target.request.request_type, HEALTH_REQUEST_TYPE);
        assert_eq!(target.request.key, "user-service-health");
        assert_eq!(target.request.reply_to, "user-service-topic");
        assert_eq!(target.request.timeout, Some(Duration::from_secs(2)));
    }
}
