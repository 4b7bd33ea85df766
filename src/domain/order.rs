//! Order and fill entities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{BrokerOrderId, ClientOrderId};
use super::symbol::Symbol;

/// Order lifecycle status.
///
/// `Filled`, `Canceled`, `Expired`, `Rejected`, and `Failed` are terminal:
/// once reached, no writer transitions an order out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted locally, not yet submitted to the broker.
    PendingNew,
    /// Submitted to the broker; no acknowledgement observed yet.
    SubmittedUnconfirmed,
    /// Acknowledged by the broker, not yet filled.
    New,
    /// Partially filled.
    PartiallyFilled,
    /// Fully filled. Terminal.
    Filled,
    /// Canceled. Terminal.
    Canceled,
    /// Expired. Terminal.
    Expired,
    /// Rejected by the broker. Terminal.
    Rejected,
    /// Failed (e.g. never found at the broker past its grace period). Terminal.
    Failed,
}

impl OrderStatus {
    /// Returns true if this status is terminal: once reached, no writer
    /// may transition the order out of it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Expired | Self::Rejected | Self::Failed
        )
    }

    /// Parse a broker-supplied status string into an `OrderStatus`.
    ///
    /// Unknown values map to `New`, the least presumptive non-terminal
    /// status, rather than failing the cycle over a broker vocabulary
    /// this core doesn't yet recognize.
    /// Whether a raw broker/orphan status string names a terminal status.
    /// Used for orphans, which are tracked by their own raw status string
    /// rather than through `parse_broker_status`.
    #[must_use]
    pub fn is_terminal_str(raw: &str) -> bool {
        matches!(
            raw,
            "filled" | "canceled" | "cancelled" | "expired" | "rejected" | "failed"
        )
    }

    #[must_use]
    pub fn parse_broker_status(raw: &str) -> Self {
        match raw {
            "pending_new" => Self::PendingNew,
            "submitted_unconfirmed" => Self::SubmittedUnconfirmed,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "canceled" | "cancelled" => Self::Canceled,
            "expired" => Self::Expired,
            "rejected" => Self::Rejected,
            "failed" => Self::Failed,
            _ => Self::New,
        }
    }
}

/// Source of a recorded fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSource {
    /// Delivered by a broker webhook (outside this core).
    Webhook,
    /// Pulled from the broker's account activities API.
    AlpacaActivity,
    /// Synthesized by this core from a broker order snapshot.
    ReconciliationBackfill,
    /// Synthesized by this core from the locally recorded order.
    ReconciliationDbBackfill,
}

/// A single fill against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    /// Unique (within the order) identifier for this fill.
    pub fill_id: String,
    /// Quantity filled.
    pub fill_qty: Decimal,
    /// Price at which the fill occurred.
    pub fill_price: Decimal,
    /// Realized P&L attributable to this fill.
    pub realized_pl: Decimal,
    /// When the fill occurred.
    pub timestamp: DateTime<Utc>,
    /// True when this fill was generated by reconciliation rather than
    /// observed directly from the broker.
    pub synthetic: bool,
    /// Where this fill record came from.
    pub source: FillSource,
    /// True once a real fill has replaced a previously injected synthetic
    /// fill covering the same gap. Set by the (out-of-scope) webhook path;
    /// this core only reads it.
    pub superseded: bool,
}

/// A locally tracked order, identified by its `ClientOrderId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Locally-assigned identifier.
    pub client_order_id: ClientOrderId,
    /// Broker-assigned identifier, present after acknowledgement.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Strategy that placed the order.
    pub strategy_id: String,
    /// Side (buy/sell), opaque passthrough for this core.
    pub side: String,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Priority of the writer that produced the current `status`.
    pub source_priority: super::ids::SourcePriority,
    /// Cumulative filled quantity, if any.
    pub filled_qty: Option<Decimal>,
    /// Average fill price, if any.
    pub filled_avg_price: Option<Decimal>,
    /// When the order was created locally.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the order reached a filled state, if it has.
    pub filled_at: Option<DateTime<Utc>>,
    /// Recorded fills, in the order they were appended.
    pub fills: Vec<FillRecord>,
}

impl Order {
    /// Sum of real (non-synthetic), non-superseded fill quantities.
    #[must_use]
    pub fn real_filled_sum(&self) -> Decimal {
        self.fills
            .iter()
            .filter(|f| !f.synthetic && !f.superseded)
            .map(|f| f.fill_qty)
            .sum()
    }

    /// Sum of synthetic, non-superseded fill quantities.
    #[must_use]
    pub fn synthetic_filled_sum(&self) -> Decimal {
        self.fills
            .iter()
            .filter(|f| f.synthetic && !f.superseded)
            .map(|f| f.fill_qty)
            .sum()
    }
}
