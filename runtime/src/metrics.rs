//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for:
//! - Dispatch outcomes (pass-through, request, cache hit, dedup, config errors)
//! - Transport results and latency
//! - Store action throughput
//!
//! Recording is always on; without an installed recorder the `metrics` macros
//! are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use gophr_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

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
///
/// Installs the global recorder and renders the Prometheus text format.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the server was configured with
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder that is already installed (e.g. by another test) is not an
    /// error; `render` then returns `None` for this instance.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
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

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "dispatch_passthrough_total",
        "Ordinary actions forwarded unchanged by the dispatch pipeline"
    );
    describe_counter!(
        "dispatch_requests_total",
        "Request events emitted for action descriptors"
    );
    describe_counter!(
        "dispatch_cache_hits_total",
        "Descriptors skipped because their cache predicate held"
    );
    describe_counter!(
        "dispatch_deduplicated_total",
        "Descriptors dropped because an identical call was in flight"
    );
    describe_counter!(
        "dispatch_success_total",
        "Success events emitted"
    );
    describe_counter!(
        "dispatch_failure_total",
        "Failure events emitted"
    );
    describe_counter!(
        "dispatch_cancelled_total",
        "Terminal events suppressed by cancellation"
    );
    describe_counter!(
        "dispatch_config_errors_total",
        "Dispatches rejected as configuration errors"
    );
    describe_histogram!(
        "dispatch_transport_duration_seconds",
        "Time taken by transport calls"
    );
    describe_counter!(
        "store_actions_total",
        "Actions reduced by the store"
    );
    describe_histogram!(
        "store_reducer_duration_seconds",
        "Time taken to run the reducer"
    );
}

/// Dispatch pipeline metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record an ordinary action forwarded unchanged.
    pub fn record_passthrough() {
        counter!("dispatch_passthrough_total").increment(1);
    }

    /// Record a request event.
    pub fn record_request() {
        counter!("dispatch_requests_total").increment(1);
    }

    /// Record a cache hit.
    pub fn record_cache_hit() {
        counter!("dispatch_cache_hits_total").increment(1);
    }

    /// Record a dropped duplicate.
    pub fn record_deduplicated() {
        counter!("dispatch_deduplicated_total").increment(1);
    }

    /// Record a success event.
    pub fn record_success() {
        counter!("dispatch_success_total").increment(1);
    }

    /// Record a failure event.
    pub fn record_failure() {
        counter!("dispatch_failure_total").increment(1);
    }

    /// Record a suppressed terminal event.
    pub fn record_cancelled() {
        counter!("dispatch_cancelled_total").increment(1);
    }

    /// Record a configuration error.
    pub fn record_config_error() {
        counter!("dispatch_config_errors_total").increment(1);
    }

    /// Record how long a transport call took.
    pub fn record_transport_duration(duration: Duration) {
        histogram!("dispatch_transport_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action reduced.
    pub fn record_action(duration: Duration) {
        counter!("store_actions_total").increment(1);
        histogram!("store_reducer_duration_seconds").record(duration.as_secs_f64());
    }
}
