// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Execution Gateway Reconciliation Core
//!
//! Reconciles the internal order/position database against the broker of
//! record: order status sync under compare-and-swap, orphan detection and
//! quarantine, fill backfill, and position reconciliation. Runs once at
//! startup (gating the rest of the execution gateway) and then on a
//! fixed interval for the life of the process.
//!
//! # Layers
//!
//! - `domain`: order/position/orphan entities and the process-wide
//!   reconciliation state singleton. No external dependencies.
//! - `ports`: `BrokerClient`, `Store`, and `Cache` traits this core
//!   consumes. No concrete adapter lives here.
//! - `reconciliation`: the cycle itself — CAS application, the missing-
//!   orders grace policy, orphan handling, fill backfill, and position
//!   reconciliation, driven by `ReconciliationService`.
//! - `observability`: Prometheus metrics export.
//! - `config`: YAML configuration loading with environment interpolation.
//! - `infra`: in-memory reference adapters for the ports above, used by
//!   the demo binary and integration tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Core domain types: orders, fills, positions, orphans, reconciliation state.
pub mod domain;

/// External systems this core depends on, expressed as traits.
pub mod ports;

/// The reconciliation cycle and its periodic/startup drivers.
pub mod reconciliation;

/// Prometheus metrics export.
pub mod observability;

/// Process configuration loading.
pub mod config;

/// In-memory reference adapters for the port traits.
pub mod infra;

pub use config::{load_config, load_config_from_string, AppConfig, ConfigError};
pub use domain::{
    BrokerOrderId, ClientOrderId, CycleStatus, FillId, FillRecord, FillSource, InvalidBypassError,
    NotionalInputs, Order, OrderStatus, OrphanOrder, OverrideContext, Position,
    ReconciliationResult, ReconciliationState, SourcePriority, Symbol,
};
pub use observability::{
    init_metrics, record_conflict_skipped, record_mismatch, record_symbol_quarantined,
    MetricsConfig, MetricsError,
};
pub use ports::{
    ActivitiesQuery, ActivityDirection, ActivityRecord, BrokerClient, BrokerError,
    BrokerOrderRecord, BrokerPositionRecord, Cache, CacheError, CasUpdateRequest, OrdersQuery,
    Store, StoreError, StoreTransaction, TradesUpdated,
};
pub use reconciliation::{CycleReport, ReconciliationConfig, ReconciliationError, ReconciliationService};
