//! Orphan order entity: a broker order with no corresponding local record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::BrokerOrderId;
use super::symbol::Symbol;

/// A broker order seen at the broker but never created locally.
///
/// Identified by `BrokerOrderId` rather than `ClientOrderId`: by
/// definition an orphan has no local client order to key on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanOrder {
    /// Broker-assigned identifier.
    pub broker_order_id: BrokerOrderId,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Strategy bucket this orphan is filed under. Always the `external`
    /// sentinel for orphans created by reconciliation.
    pub strategy_id: String,
    /// Side, opaque passthrough.
    pub side: String,
    /// Raw broker status string as last observed. Orphans use the
    /// broker's own vocabulary (plus the `untracked` sentinel when the
    /// broker supplied none) rather than the `OrderStatus` enum, since an
    /// orphan is by definition outside this core's own order lifecycle.
    pub status: String,
    /// Best-effort notional value at time of detection.
    pub estimated_notional: Decimal,
    /// When this orphan was first recorded.
    pub created_at: DateTime<Utc>,
    /// When this orphan was last observed at the broker.
    pub updated_at: DateTime<Utc>,
    /// Stamped once the orphan is observed in a terminal status on a
    /// "recent" sweep. `None` while still open.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A minimal view of a broker order snapshot sufficient to compute an
/// orphan's estimated notional, independent of how that snapshot arrived
/// (open-orders sweep vs. recent-activity sweep).
#[derive(Debug, Clone, Copy)]
pub struct NotionalInputs {
    /// Broker-reported notional, if present.
    pub notional: Option<Decimal>,
    /// Order quantity, if present.
    pub qty: Option<Decimal>,
    /// Limit price, if present.
    pub limit_price: Option<Decimal>,
    /// Average fill price, if present.
    pub filled_avg_price: Option<Decimal>,
}

impl NotionalInputs {
    /// Estimate notional value: prefer the broker's own notional figure,
    /// then `qty * limit_price`, then `qty * filled_avg_price`, else zero.
    #[must_use]
    pub fn estimate(&self) -> Decimal {
        if let Some(notional) = self.notional {
            return notional;
        }
        if let (Some(qty), Some(limit_price)) = (self.qty, self.limit_price) {
            return qty * limit_price;
        }
        if let (Some(qty), Some(avg_price)) = (self.qty, self.filled_avg_price) {
            return qty * avg_price;
        }
        Decimal::ZERO
    }
}
