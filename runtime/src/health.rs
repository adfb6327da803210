//! Health reporting for bridged services.
//!
//! Each backend service answers a `"health"` request; the fanout coordinator
//! turns the outcomes into [`HealthCheck`]s and folds them into a
//! [`HealthReport`] whose status is the worst of its checks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Health status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service answered successfully.
    Healthy,

    /// Service answered, but reported a failure.
    Degraded,

    /// Service could not be reached or did not answer in time.
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Service name, e.g. `"user-service"`.
    pub service: String,

    /// Current health status
    pub status: HealthStatus,

    /// Failure detail, absent when healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Extra detail such as the correlation ID or latency
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Aggregated health report
///
/// Combines the checks of every service into an overall status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status (worst of all checks)
    pub status: HealthStatus,

    /// Individual service checks, in request order
    pub services: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(services: Vec<HealthCheck>) -> Self {
        let status = services
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            services,
            timestamp: Utc::now(),
        }
    }

    /// Look up the check for `service`.
    #[must_use]
    pub fn check(&self, service: &str) -> Option<&HealthCheck> {
        self.services.iter().find(|c| c.service == service)
    }

    /// Check if every service is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if the worst service is degraded
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Check if any service is unhealthy
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }
}
