//! Operational metrics for the store and the export coordinator
//!
//! Recorded through the `metrics` facade; nothing is collected unless a
//! recorder is installed (see [`init_metrics_exporter`]).
//!
//! # Metrics
//!
//! - `chatkeep_store_operations_total`: Counter of store operations by `op` and `status`
//! - `chatkeep_store_operation_seconds`: Histogram of store operation duration by `op`
//! - `chatkeep_index_rebuilds_total`: Counter of full search index rebuilds
//! - `chatkeep_index_skipped_records`: Histogram of records skipped per rebuild
//! - `chatkeep_exports_total`: Counter of exported items by `format` and `outcome`
//!
//! # Examples
//!
//! ```
//! use chatkeep::metrics::OperationTimer;
//!
//! let timer = OperationTimer::start("save");
//! timer.success();
//! ```

use std::cell::Cell;
use std::time::Instant;

use metrics::{histogram, increment_counter};

/// Timing and outcome of a single store operation
///
/// Records `status="error"` on drop if neither [`success`](Self::success)
/// nor [`failure`](Self::failure) was called, so early returns through `?`
/// are still counted.
#[derive(Debug)]
pub struct OperationTimer {
    op: &'static str,
    start: Instant,
    recorded: Cell<bool>,
}

impl OperationTimer {
    /// Start timing `op`
    pub fn start(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
            recorded: Cell::new(false),
        }
    }

    /// Operation label
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// Record a successful completion
    pub fn success(&self) {
        self.record("ok");
    }

    /// Record a failure
    pub fn failure(&self) {
        self.record("error");
    }

    /// Record success or failure from a result, passing it through
    pub fn observe<T>(self, result: crate::error::Result<T>) -> crate::error::Result<T> {
        match &result {
            Ok(_) => self.success(),
            Err(_) => self.failure(),
        }
        result
    }

    fn record(&self, status: &'static str) {
        if self.recorded.replace(true) {
            return;
        }

        histogram!(
            "chatkeep_store_operation_seconds",
            self.start.elapsed().as_secs_f64(),
            "op" => self.op
        );
        increment_counter!(
            "chatkeep_store_operations_total",
            "op" => self.op,
            "status" => status
        );
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !self.recorded.get() {
            self.record("error");
        }
    }
}

/// Count a full search index rebuild
pub fn record_index_rebuild(indexed: usize, skipped: usize) {
    increment_counter!("chatkeep_index_rebuilds_total");
    histogram!("chatkeep_index_skipped_records", skipped as f64);
    tracing::debug!(indexed, skipped, "index rebuild recorded");
}

/// Count one exported item
pub fn record_export(format: &str, outcome: &'static str) {
    increment_counter!(
        "chatkeep_exports_total",
        "format" => format.to_string(),
        "outcome" => outcome
    );
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when compiled with the `prometheus` feature; otherwise
/// it is a no-op that is still safe to call.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let _ = PrometheusBuilder::new().install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
