//! Observability for the reconciliation core: Prometheus metrics export.
//! Logging is plain `tracing`, initialized directly in `main`.

mod metrics;

pub use metrics::{
    init_metrics, record_conflict_skipped, record_mismatch, record_symbol_quarantined,
    MetricsConfig, MetricsError,
};
