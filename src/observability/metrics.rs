//! Prometheus metrics for the reconciliation core.
//!
//! # Example
//!
//! ```ignore
//! use reconciliation_core::observability::{init_metrics, MetricsConfig};
//!
//! let config = MetricsConfig::default();
//! init_metrics(&config).expect("failed to initialize metrics");
//!
//! record_mismatch("pod-a", "AAPL", "momentum");
//! ```

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".parse().expect("valid default address"),
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with a custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self { listen_addr: addr }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Record that a locally tracked order's broker-observed state diverged
/// from what this core had on file for it.
pub fn record_mismatch(pod: &str, symbol: &str, strategy: &str) {
    counter!(
        "reconciliation_mismatches_total",
        "pod" => pod.to_string(),
        "symbol" => symbol.to_string(),
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Record that a compare-and-swap write was rejected because a
/// higher-priority or newer write already held the row.
pub fn record_conflict_skipped(pod: &str, reason: &str) {
    counter!(
        "reconciliation_conflicts_skipped_total",
        "pod" => pod.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record that a symbol was placed under quarantine following orphan
/// detection.
pub fn record_symbol_quarantined(pod: &str, symbol: &str) {
    counter!(
        "execution_gateway_symbols_quarantined_total",
        "pod" => pod.to_string(),
        "symbol" => symbol.to_string()
    )
    .increment(1);
}
