//! The durable store this core consumes: orders, orphans, positions, and
//! high-water marks.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{BrokerOrderId, ClientOrderId, Order, OrderStatus, OrphanOrder, Position, SourcePriority, Symbol};

/// Errors surfaced by a `Store` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store connection error: {0}")]
    Connection(String),
    /// The store reached but a write or read failed for a reason other
    /// than connectivity (constraint violation, serialization failure).
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Request for `Store::update_order_status_cas`.
///
/// The store applies this only if the stored `source_priority` is at
/// least as permissive as `source_priority`, the stored status is
/// non-terminal, and the stored `updated_at` is no newer than
/// `updated_at`. On apply, every field here replaces the stored row; on
/// rejection the store returns `Ok(None)` rather than an error.
#[derive(Debug, Clone)]
pub struct CasUpdateRequest {
    /// Order to update.
    pub client_order_id: ClientOrderId,
    /// New status.
    pub status: OrderStatus,
    /// Priority of the writer making this request.
    pub source_priority: SourcePriority,
    /// New cumulative filled quantity, if known.
    pub filled_qty: Option<Decimal>,
    /// New average fill price, if known.
    pub filled_avg_price: Option<Decimal>,
    /// Timestamp this update is attributed to.
    pub updated_at: DateTime<Utc>,
    /// Broker-assigned identifier, if now known.
    pub broker_order_id: Option<BrokerOrderId>,
}

/// Result of `StoreTransaction::recalculate_trade_realized_pnl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradesUpdated {
    /// Number of trade rows whose realized P&L was recalculated.
    pub trades_updated: u64,
}

/// A scoped connection acquired via `Store::transaction`.
///
/// Dropping a transaction without calling `commit` is a caller bug; the
/// in-memory reference adapter treats it as an implicit rollback, but a
/// real adapter backed by a database connection pool should not rely on
/// that — callers must explicitly commit or roll back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Lock and return the order for update within this transaction.
    async fn get_order_for_update(
        &mut self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<Order>, StoreError>;

    /// Append a fill to an order's fill list. Idempotent on `FillID`:
    /// appending a fill whose ID already exists on the order is a no-op
    /// that returns the order unchanged rather than an error.
    async fn append_fill_to_order_metadata(
        &mut self,
        client_order_id: &ClientOrderId,
        fill: crate::domain::FillRecord,
    ) -> Result<Option<Order>, StoreError>;

    /// Recalculate realized P&L for trades in `(strategy_id, symbol)`.
    async fn recalculate_trade_realized_pnl(
        &mut self,
        strategy_id: &str,
        symbol: &Symbol,
        update_all: bool,
    ) -> Result<TradesUpdated, StoreError>;

    /// Commit the transaction. Consumes the transaction handle.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Roll back the transaction. Consumes the transaction handle.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// The durable store consumed by reconciliation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a named high-water mark.
    async fn get_high_water_mark(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Advance a named high-water mark. Callers are responsible for
    /// never regressing it; the store does not enforce monotonicity.
    async fn set_high_water_mark(&self, name: &str, when: DateTime<Utc>) -> Result<(), StoreError>;

    /// All locally tracked orders whose status is not terminal.
    async fn get_non_terminal_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Of `ids`, the subset this store has an order record for.
    async fn get_order_ids_by_client_ids(
        &self,
        ids: &[ClientOrderId],
    ) -> Result<HashSet<ClientOrderId>, StoreError>;

    /// Orders matching any of `broker_ids`.
    async fn get_orders_by_broker_ids(
        &self,
        broker_ids: &[BrokerOrderId],
    ) -> Result<Vec<Order>, StoreError>;

    /// Apply a compare-and-swap status update. Returns the updated order
    /// on success, `None` if the CAS condition was not met.
    async fn update_order_status_cas(
        &self,
        request: CasUpdateRequest,
    ) -> Result<Option<Order>, StoreError>;

    /// Up to `limit` filled orders whose recorded fill quantity does not
    /// yet account for their full `filled_qty`.
    async fn get_filled_orders_missing_fills(&self, limit: usize) -> Result<Vec<Order>, StoreError>;

    /// Record a newly detected orphan order.
    async fn create_orphan_order(&self, orphan: OrphanOrder) -> Result<(), StoreError>;

    /// Update an orphan's status, stamping `resolved_at` when given.
    async fn update_orphan_order_status(
        &self,
        broker_order_id: &BrokerOrderId,
        status: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Total estimated notional exposure recorded against orphans for
    /// `(symbol, strategy_id)`.
    async fn get_orphan_exposure(
        &self,
        symbol: &Symbol,
        strategy_id: &str,
    ) -> Result<Decimal, StoreError>;

    /// All locally tracked position snapshots.
    async fn get_all_positions(&self) -> Result<Vec<Position>, StoreError>;

    /// Upsert a position snapshot.
    async fn upsert_position_snapshot(&self, position: Position) -> Result<(), StoreError>;

    /// Open a scoped transaction. Nested transactions are not supported.
    async fn transaction(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// The terminal order statuses, as required by the store's CAS
/// semantics: once an order reaches one of these, `update_order_status_cas`
/// must reject further writes regardless of source priority.
#[must_use]
pub fn terminal_statuses() -> [OrderStatus; 5] {
    [
        OrderStatus::Filled,
        OrderStatus::Canceled,
        OrderStatus::Expired,
        OrderStatus::Rejected,
        OrderStatus::Failed,
    ]
}
