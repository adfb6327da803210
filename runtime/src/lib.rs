//! # Kafka Bridge Runtime
//!
//! Request/reply over a publish/subscribe transport.
//!
//! A caller hands the [`Dispatcher`] a request; the dispatcher registers a
//! waiter under a fresh correlation ID, publishes the request envelope and
//! suspends until a [`ReplyListener`] delivers the matching reply or the
//! deadline passes.
//!
//! ## Core Components
//!
//! - **Correlation Registry**: in-flight waiters keyed by correlation ID
//! - **Reply Listener**: one task per reply topic, resolving waiters
//! - **Dispatcher**: register, publish, await with deadline, always unregister
//! - **Fanout Coordinator**: concurrent dispatches with an ordered report
//! - **Bridge**: composition root wiring the above around one registry
//!
//! ## Example
//!
//! ```ignore
//! use kafka_bridge_runtime::{Bridge, BridgeConfig};
//!
//! let config = BridgeConfig::from_env()?;
//! let bridge = Bridge::start(transport, &config).await?;
//!
//! let request = bridge
//!     .request("login", "user-service-topic")
//!     .with_key("user-login")
//!     .with_json_payload(&credentials)?;
//!
//! match bridge.dispatcher().send(request).await {
//!     Ok(reply) if reply.is_success() => println!("token: {}", reply.data()),
//!     Ok(reply) => println!("rejected: {}", reply.error()),
//!     Err(e) => println!("bridge failure: {e}"),
//! }
//! ```

/// Composition root
pub mod bridge;

/// Configuration from code or environment
pub mod config;

/// Request dispatch with deadline
pub mod dispatcher;

/// Concurrent multi-service dispatch
pub mod fanout;

/// Service health reporting
pub mod health;

/// Reply listeners
pub mod listener;

/// Prometheus metrics for observability
pub mod metrics;

/// In-flight request table
pub mod registry;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError, ServiceTopic};
pub use dispatcher::{DEFAULT_TIMEOUT, Dispatcher, DomainFailure, OutboundRequest, Reply};
pub use fanout::{FanoutCoordinator, FanoutReport, FanoutTarget, HealthTarget, ServiceOutcome};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use listener::{ListenerExit, ListenerHandle, ReplyListener};
pub use registry::{CorrelationRegistry, Registration, RegistryStatsSnapshot};
