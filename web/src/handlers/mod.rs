//! HTTP request handlers.

pub mod health;
pub mod metrics;

// Re-export common handler utilities
pub use health::{health_check, services_health};
pub use metrics::metrics;
