//! Prometheus metrics for observability and monitoring.
//!
//! Metrics are recorded through the `metrics` facade everywhere in the
//! runtime; installing a recorder is optional. [`MetricsServer`] installs the
//! Prometheus recorder and renders the scrape text.
//!
//! | metric | kind | labels |
//! |--------|------|--------|
//! | `store.commands.total` | counter | |
//! | `store.reducer.duration_seconds` | histogram | |
//! | `store.effects.executed` | counter | `type` |
//! | `resource.requests.total` | counter | `operation`, `outcome` |
//! | `resource.cache.hits` | counter | `kind` |
//! | `resource.request.duration_seconds` | histogram | `operation` |
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_resource_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! println!("{}", server.render().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

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

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Address the scrape endpoint is meant to be served on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_histogram!("store.reducer.duration_seconds", "Time taken to execute reducers");
    describe_counter!("store.effects.executed", "Total number of effects executed, by type");

    describe_counter!(
        "resource.requests.total",
        "Resource operations by operation and outcome (success, failure, cached, deduplicated)"
    );
    describe_counter!("resource.cache.hits", "Request cache lookups by result kind");
    describe_histogram!(
        "resource.request.duration_seconds",
        "Time from issuing a resource operation to its outcome"
    );
}

/// Resource operation metrics recorder.
pub struct ResourceMetrics;

impl ResourceMetrics {
    /// Record the outcome of one operation.
    pub fn record_request(operation: &str, outcome: &'static str, duration: Duration) {
        counter!(
            "resource.requests.total",
            "operation" => operation.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("resource.request.duration_seconds", "operation" => operation.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record one cache lookup.
    pub fn record_cache(kind: &'static str) {
        counter!("resource.cache.hits", "kind" => kind).increment(1);
    }
}
