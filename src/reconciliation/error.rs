//! The error type surfaced by a reconciliation cycle.

use thiserror::Error;

use crate::ports::{BrokerError, CacheError, StoreError};

/// Errors that can fail a reconciliation cycle.
///
/// CAS conflicts are deliberately absent: a rejected compare-and-swap is
/// expected traffic, not a failure, and is tracked via the
/// `reconciliation_conflicts_skipped_total` counter instead.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// The broker could not be reached.
    #[error("broker connection error: {0}")]
    Connection(String),
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(String),
    /// A broker payload could not be interpreted.
    #[error("validation error: {0}")]
    Validation(String),
    /// P&L recalculation failed inside a fill-backfill transaction; the
    /// transaction was rolled back.
    #[error("recalculation failed for {scope}: {source}")]
    Recalculation {
        /// `strategy_id:symbol` the recalculation was scoped to.
        scope: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// The cycle ran longer than its configured wall-clock bound.
    #[error("reconciliation cycle timed out after {0} seconds")]
    Timeout(f64),
}

impl From<BrokerError> for ReconciliationError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Connection(msg) => Self::Connection(msg),
        }
    }
}

impl From<StoreError> for ReconciliationError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Cache errors are never propagated as cycle failures; this conversion
/// exists only so call sites can `.map_err` into a loggable string
/// without special-casing cache calls.
impl From<CacheError> for ReconciliationError {
    fn from(err: CacheError) -> Self {
        Self::Store(format!("unexpected: cache error surfaced as fatal: {err}"))
    }
}
