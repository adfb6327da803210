//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the bridge:
//! - Dispatched requests by type and outcome
//! - Publish failures and timeouts
//! - Replies received, undecodable replies and orphaned replies
//! - In-flight waiters
//!
//! # Example
//!
//! ```rust,no_run
//! use kafka_bridge_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.start()?;
//!
//! if let Some(rendered) = exporter.render() {
//!     println!("{rendered}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
///
/// Installs the global recorder. Its [`handle`](Self::handle) is what an HTTP
/// edge renders on a scrape endpoint; this type does not listen itself.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this exporter.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "bridge_requests_total",
        "Total number of bridged requests by type and outcome"
    );
    describe_histogram!(
        "bridge_request_duration_seconds",
        "Time from dispatch to reply, timeout or failure"
    );
    describe_counter!(
        "bridge_publish_errors_total",
        "Total number of request envelopes the transport rejected"
    );
    describe_counter!(
        "bridge_timeouts_total",
        "Total number of requests that got no reply before their deadline"
    );
    describe_counter!(
        "bridge_replies_received_total",
        "Total number of reply envelopes decoded by reply listeners"
    );
    describe_counter!(
        "bridge_reply_decode_errors_total",
        "Total number of reply messages that could not be decoded"
    );
    describe_counter!(
        "bridge_reply_receive_errors_total",
        "Total number of transport errors seen by reply listeners"
    );
    describe_counter!(
        "bridge_replies_orphaned_total",
        "Replies with no waiting request, by reason (unknown or duplicate)"
    );
    describe_gauge!(
        "bridge_pending_requests",
        "Requests currently waiting for a reply"
    );
}

/// Bridge metrics recorder.
pub struct BridgeMetrics;

impl BridgeMetrics {
    /// Record a finished request.
    pub fn record_request(request_type: &str, outcome: &'static str, duration: Duration) {
        counter!(
            "bridge_requests_total",
            "request_type" => request_type.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("bridge_request_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish failure.
    pub fn record_publish_error() {
        counter!("bridge_publish_errors_total").increment(1);
    }

    /// Record a timeout.
    pub fn record_timeout() {
        counter!("bridge_timeouts_total").increment(1);
    }

    /// Record a decoded reply.
    pub fn record_reply() {
        counter!("bridge_replies_received_total").increment(1);
    }

    /// Record an undecodable reply.
    pub fn record_decode_error() {
        counter!("bridge_reply_decode_errors_total").increment(1);
    }

    /// Record a transport error on a reply stream.
    pub fn record_receive_error() {
        counter!("bridge_reply_receive_errors_total").increment(1);
    }

    /// Record an orphaned reply.
    pub fn record_orphan(reason: &'static str) {
        counter!("bridge_replies_orphaned_total", "reason" => reason).increment(1);
    }

    /// Record the number of in-flight waiters.
    #[allow(clippy::cast_precision_loss)] // waiter counts stay far below 2^52
    pub fn record_pending(count: usize) {
        gauge!("bridge_pending_requests").set(count as f64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_exporter_creation() {
        let exporter = MetricsExporter::new();
        assert!(exporter.handle().is_none());
        assert!(exporter.render().is_none());
    }

    #[test]
    fn test_local_recorder_renders_bridge_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            BridgeMetrics::record_publish_error();
            BridgeMetrics::record_pending(3);
        });

        let rendered = handle.render();
        assert!(rendered.contains("bridge_publish_errors_total 1"));
        assert!(rendered.contains("bridge_pending_requests 3"));
    }

    #[test]
    fn test_metrics_exporter_render() {
        let mut exporter = MetricsExporter::new();
        exporter.start().unwrap();

        BridgeMetrics::record_request("login", "success", Duration::from_millis(40));
        BridgeMetrics::record_timeout();
        BridgeMetrics::record_orphan("unknown");

        // Another test may own the global recorder; metrics are still recorded.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("bridge_requests_total"));
            assert!(rendered.contains("bridge_timeouts_total"));
            assert!(rendered.contains("bridge_replies_orphaned_total"));
        }
    }
}
