//! Reconciliation cycle: order sync, orphan/quarantine handling, fill
//! backfill, and position reconciliation, driven by a single orchestrator.

pub mod cas;
pub mod config;
pub mod error;
pub mod fills;
pub mod merge;
pub mod missing_orders;
pub mod orchestrator;
pub mod orphan;
pub mod positions;

pub use cas::{apply_broker_update, CasDisposition};
pub use config::ReconciliationConfig;
pub use error::ReconciliationError;
pub use fills::{
    backfill_alpaca_fills, backfill_from_broker_order, backfill_from_db_order,
    backfill_missing_fills_scan, compute_synthetic_fill, AlpacaBackfillResult, SyntheticOrigin,
};
pub use merge::merge;
pub use missing_orders::{reconcile_missing_orders, MissingOrdersOutcome};
pub use orchestrator::{CycleReport, ReconciliationService};
pub use orphan::{detect_orphans, handle_orphan};
pub use positions::{reconcile_positions, PositionReconciliationResult};
