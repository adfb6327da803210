//! Bridge configuration.
//!
//! Values come from the application: either built explicitly with the
//! `with_*` methods or read from the environment with
//! [`BridgeConfig::from_env`].
//!
//! | Variable                      | Default                                    |
//! |-------------------------------|--------------------------------------------|
//! | `KAFKA_BROKERS`               | `localhost:9092`                           |
//! | `BRIDGE_REQUEST_TOPIC`        | `api-gateway-topic`                        |
//! | `BRIDGE_REPLY_TOPICS`         | `user-service-topic,product-service-topic` |
//! | `BRIDGE_SERVICE_TOPICS`       | `user-service=user-service-requests,product-service=product-service-requests` |
//! | `BRIDGE_CONSUMER_GROUP`       | `api-gateway-group`                        |
//! | `BRIDGE_DEFAULT_TIMEOUT_MS`   | `10000`                                    |
//! | `BRIDGE_PUBLISH_TIMEOUT_MS`   | `5000`                                     |

use crate::dispatcher::DEFAULT_TIMEOUT;
use crate::fanout::HealthTarget;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable held a value that could not be parsed.
    #[error("Invalid value for {variable}: '{value}' ({reason})")]
    InvalidValue {
        /// Variable name
        variable: &'static str,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A variable that must not be empty was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// A backend service and the topic only it consumes.
///
/// Health requests are addressed here rather than to the shared request
/// topic, where any service could answer for any other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTopic {
    /// Service label, e.g. `user-service`.
    pub service: String,
    /// Topic the service alone consumes.
    pub request_topic: String,
}

impl ServiceTopic {
    /// Pair `service` with its own request topic.
    #[must_use]
    pub fn new(service: impl Into<String>, request_topic: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            request_topic: request_topic.into(),
        }
    }
}

/// Configuration for the bridge and its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Comma separated broker list.
    ///
    /// Default: `localhost:9092`
    pub brokers: String,

    /// Topic requests are published to.
    ///
    /// Default: `api-gateway-topic`
    pub request_topic: String,

    /// Topics replies arrive on; one listener each.
    ///
    /// Default: `user-service-topic`, `product-service-topic`
    pub reply_topics: Vec<String>,

    /// Per-service request topics, in health report order.
    ///
    /// Default: `user-service` on `user-service-requests`,
    /// `product-service` on `product-service-requests`
    pub service_topics: Vec<ServiceTopic>,

    /// Consumer group of the reply listeners.
    ///
    /// Default: `api-gateway-group`
    pub consumer_group: String,

    /// Deadline for requests that set none.
    ///
    /// Default: 10 seconds
    pub default_timeout: Duration,

    /// Bound on a single publish call.
    ///
    /// Default: 5 seconds
    pub publish_timeout: Duration,
}

impl BridgeConfig {
    /// Create a configuration for `brokers` with default topics and timeouts.
    #[must_use]
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            ..Self::default()
        }
    }

    /// Set the request topic.
    #[must_use]
    pub fn with_request_topic(mut self, topic: impl Into<String>) -> Self {
        self.request_topic = topic.into();
        self
    }

    /// Set the reply topics.
    #[must_use]
    pub fn with_reply_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reply_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-service request topics.
    #[must_use]
    pub fn with_service_topics<I, S, T>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        self.service_topics = services
            .into_iter()
            .map(|(service, topic)| ServiceTopic::new(service, topic))
            .collect();
        self
    }

    /// Set the consumer group.
    #[must_use]
    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    /// Set the default request deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the publish bound.
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let brokers = non_empty(&lookup, "KAFKA_BROKERS")?.unwrap_or(defaults.brokers);
        let request_topic =
            non_empty(&lookup, "BRIDGE_REQUEST_TOPIC")?.unwrap_or(defaults.request_topic);
        let consumer_group =
            non_empty(&lookup, "BRIDGE_CONSUMER_GROUP")?.unwrap_or(defaults.consumer_group);

        let reply_topics = match lookup("BRIDGE_REPLY_TOPICS") {
            Some(raw) => {
                let topics: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToString::to_string)
                    .collect();
                if topics.is_empty() {
                    return Err(ConfigError::Empty("BRIDGE_REPLY_TOPICS"));
                }
                topics
            }
            None => defaults.reply_topics,
        };

        let service_topics = match lookup("BRIDGE_SERVICE_TOPICS") {
            Some(raw) => parse_service_topics(&raw)?,
            None => defaults.service_topics,
        };

        let default_timeout = millis(&lookup, "BRIDGE_DEFAULT_TIMEOUT_MS")?
            .unwrap_or(defaults.default_timeout);
        let publish_timeout = millis(&lookup, "BRIDGE_PUBLISH_TIMEOUT_MS")?
            .unwrap_or(defaults.publish_timeout);

        Ok(Self {
            brokers,
            request_topic,
            reply_topics,
            service_topics,
            consumer_group,
            default_timeout,
            publish_timeout,
        })
    }

    /// One health target per configured service.
    ///
    /// Each request goes to the service's own topic. Replies come back on
    /// `<service>-topic` when that is a configured reply topic, otherwise on
    /// the first reply topic; the correlation ID alone routes them.
    #[must_use]
    pub fn health_targets(&self) -> Vec<HealthTarget> {
        let fallback = self.reply_topics.first().map_or("", String::as_str);
        self.service_topics
            .iter()
            .map(|entry| {
                let own = format!("{}-topic", entry.service);
                let reply_to = if self.reply_topics.contains(&own) {
                    own.as_str()
                } else {
                    fallback
                };
                HealthTarget::new(&entry.service, &entry.request_topic, reply_to)
            })
            .collect()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            request_topic: "api-gateway-topic".to_string(),
            reply_topics: vec![
                "user-service-topic".to_string(),
                "product-service-topic".to_string(),
            ],
            service_topics: vec![
                ServiceTopic::new("user-service", "user-service-requests"),
                ServiceTopic::new("product-service", "product-service-requests"),
            ],
            consumer_group: "api-gateway-group".to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            publish_timeout: Duration::from_secs(5),
        }
    }
}

fn non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
) -> Result<Option<String>, ConfigError> {
    match lookup(variable) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(variable)),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

/// Parse `service=topic,service=topic`.
fn parse_service_topics(raw: &str) -> Result<Vec<ServiceTopic>, ConfigError> {
    const VARIABLE: &str = "BRIDGE_SERVICE_TOPICS";

    let mut entries = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair
            .split_once('=')
            .map(|(service, topic)| (service.trim(), topic.trim()))
            .filter(|(service, topic)| !service.is_empty() && !topic.is_empty());
        let Some((service, topic)) = parsed else {
            return Err(ConfigError::InvalidValue {
                variable: VARIABLE,
                value: raw.to_string(),
                reason: format!("expected service=topic, got '{pair}'"),
            });
        };
        entries.push(ServiceTopic::new(service, topic));
    }

    if entries.is_empty() {
        return Err(ConfigError::Empty(VARIABLE));
    }
    Ok(entries)
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = lookup(variable) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            variable,
            value,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(ms) => Ok(Some(Duration::from_millis(ms))),
        Err(e) => Err(ConfigError::InvalidValue {
            variable,
            value,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.consumer_group, "api-gateway-group");
    }

    #[test]
    fn test_reads_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("KAFKA_BROKERS", "broker-1:9092,broker-2:9092"),
            ("BRIDGE_REPLY_TOPICS", " user-service-topic , ,order-service-topic"),
            ("BRIDGE_DEFAULT_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();

        assert_eq!(config.brokers, "broker-1:9092,broker-2:9092");
        assert_eq!(
            config.reply_topics,
            vec!["user-service-topic", "order-service-topic"]
        );
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.publish_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BridgeConfig::from_lookup(lookup(&[("BRIDGE_DEFAULT_TIMEOUT_MS", "soon")])),
            Err(ConfigError::InvalidValue { variable: "BRIDGE_DEFAULT_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            BridgeConfig::from_lookup(lookup(&[("BRIDGE_PUBLISH_TIMEOUT_MS", "0")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            BridgeConfig::from_lookup(lookup(&[("BRIDGE_REPLY_TOPICS", " , ")])),
            Err(ConfigError::Empty("BRIDGE_REPLY_TOPICS"))
        );
        assert_eq!(
            BridgeConfig::from_lookup(lookup(&[("KAFKA_BROKERS", "")])),
            Err(ConfigError::Empty("KAFKA_BROKERS"))
        );
    }

    #[test]
    fn test_reads_service_topics() {
        let config = BridgeConfig::from_lookup(lookup(&[(
            "BRIDGE_SERVICE_TOPICS",
            "user-service = users-in, ,order-service=orders-in",
        )]))
        .unwrap();

        assert_eq!(
            config.service_topics,
            vec![
                ServiceTopic::new("user-service", "users-in"),
                ServiceTopic::new("order-service", "orders-in"),
            ]
        );
    }

    #[test]
    fn test_rejects_malformed_service_topics() {
        assert!(matches!(
            BridgeConfig::from_lookup(lookup(&[("BRIDGE_SERVICE_TOPICS", "user-service")])),
            Err(ConfigError::InvalidValue { variable: "BRIDGE_SERVICE_TOPICS", .. })
        ));
        assert!(matches!(
            BridgeConfig::from_lookup(lookup(&[("BRIDGE_SERVICE_TOPICS", "=users-in")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            BridgeConfig::from_lookup(lookup(&[("BRIDGE_SERVICE_TOPICS", ",")])),
            Err(ConfigError::Empty("BRIDGE_SERVICE_TOPICS"))
        );
    }

    #[test]
    fn test_health_targets_use_service_topics() {
        let targets = BridgeConfig::default().health_targets();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].service, "user-service");
        assert_eq!(targets[0].topic, "user-service-requests");
        assert_eq!(targets[0].reply_to, "user-service-topic");
        assert_eq!(targets[1].service, "product-service");
        assert_eq!(targets[1].topic, "product-service-requests");
        assert_eq!(targets[1].reply_to, "product-service-topic");
        // Never the shared request topic.
        assert!(targets.iter().all(|t| t.topic != "api-gateway-topic"));
    }

    #[test]
    fn test_health_targets_fall_back_to_first_reply_topic() {
        let config = BridgeConfig::new("localhost:9092")
            .with_reply_topics(["gateway-replies"])
            .with_service_topics([("inventory", "inventory-requests")]);
        let targets = config.health_targets();

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].service, "inventory");
        assert_eq!(targets[0].topic, "inventory-requests");
        assert_eq!(targets[0].reply_to, "gateway-replies");
    }
}
