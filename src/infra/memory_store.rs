//! In-memory `Store` implementation for testing and the demo binary.
//!
//! Not for production use: transactions stage their writes in an overlay
//! applied on commit, but `get_order_for_update` still reads through to
//! the live map rather than taking a real row lock, and
//! `recalculate_trade_realized_pnl` is a no-op stub since this adapter
//! does not model trade rows at all.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    BrokerOrderId, ClientOrderId, FillRecord, Order, OrderStatus, OrphanOrder, Position, Symbol,
};
use crate::ports::{CasUpdateRequest, Store, StoreError, StoreTransaction, TradesUpdated};

#[derive(Debug, Default)]
struct StoreData {
    orders: HashMap<String, Order>,
    orphans: HashMap<String, OrphanOrder>,
    positions: HashMap<Symbol, Position>,
    high_water_marks: HashMap<String, DateTime<Utc>>,
}

/// In-memory reference implementation of `Store`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<StoreData>>,
}

impl MemoryStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order directly (test setup).
    pub fn insert_order(&self, order: Order) {
        let mut data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.orders.insert(order.client_order_id.as_str().to_string(), order);
    }

    /// Read an order back out (test assertions).
    #[must_use]
    pub fn get_order(&self, client_order_id: &ClientOrderId) -> Option<Order> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.orders.get(client_order_id.as_str()).cloned()
    }

    /// Read an orphan back out (test assertions).
    #[must_use]
    pub fn get_orphan(&self, broker_order_id: &BrokerOrderId) -> Option<OrphanOrder> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.orphans.get(broker_order_id.as_str()).cloned()
    }
}

fn cas_may_apply(stored: &Order, request: &CasUpdateRequest) -> bool {
    !stored.status.is_terminal()
        && stored.source_priority >= request.source_priority
        && stored.updated_at <= request.updated_at
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_high_water_mark(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data.high_water_marks.get(name).copied())
    }

    async fn set_high_water_mark(&self, name: &str, when: DateTime<Utc>) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.high_water_marks.insert(name.to_string(), when);
        Ok(())
    }

    async fn get_non_terminal_orders(&self) -> Result<Vec<Order>, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data.orders.values().filter(|o| !o.status.is_terminal()).cloned().collect())
    }

    async fn get_order_ids_by_client_ids(
        &self,
        ids: &[ClientOrderId],
    ) -> Result<HashSet<ClientOrderId>, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(ids
            .iter()
            .filter(|id| data.orders.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn get_orders_by_broker_ids(
        &self,
        broker_ids: &[BrokerOrderId],
    ) -> Result<Vec<Order>, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let wanted: HashSet<&str> = broker_ids.iter().map(BrokerOrderId::as_str).collect();
        Ok(data
            .orders
            .values()
            .filter(|o| o.broker_order_id.as_ref().is_some_and(|id| wanted.contains(id.as_str())))
            .cloned()
            .collect())
    }

    async fn update_order_status_cas(
        &self,
        request: CasUpdateRequest,
    ) -> Result<Option<Order>, StoreError> {
        let mut data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(order) = data.orders.get_mut(request.client_order_id.as_str()) else {
            return Ok(None);
        };
        if !cas_may_apply(order, &request) {
            return Ok(None);
        }
        order.status = request.status;
        order.source_priority = request.source_priority;
        if request.filled_qty.is_some() {
            order.filled_qty = request.filled_qty;
        }
        if request.filled_avg_price.is_some() {
            order.filled_avg_price = request.filled_avg_price;
        }
        order.updated_at = request.updated_at;
        if request.broker_order_id.is_some() {
            order.broker_order_id = request.broker_order_id;
        }
        if request.status == OrderStatus::Filled && order.filled_at.is_none() {
            order.filled_at = Some(request.updated_at);
        }
        Ok(Some(order.clone()))
    }

    async fn get_filled_orders_missing_fills(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data
            .orders
            .values()
            .filter(|o| {
                let Some(filled_qty) = o.filled_qty else { return false };
                o.status == OrderStatus::Filled
                    && o.real_filled_sum() + o.synthetic_filled_sum() < filled_qty
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_orphan_order(&self, orphan: OrphanOrder) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.orphans.insert(orphan.broker_order_id.as_str().to_string(), orphan);
        Ok(())
    }

    async fn update_orphan_order_status(
        &self,
        broker_order_id: &BrokerOrderId,
        status: &str,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(orphan) = data.orphans.get_mut(broker_order_id.as_str()) else {
            return Err(StoreError::Operation(format!(
                "orphan order {broker_order_id} not found"
            )));
        };
        orphan.status = status.to_string();
        orphan.updated_at = resolved_at.unwrap_or(orphan.updated_at);
        if resolved_at.is_some() {
            orphan.resolved_at = resolved_at;
        }
        Ok(())
    }

    async fn get_orphan_exposure(
        &self,
        symbol: &Symbol,
        strategy_id: &str,
    ) -> Result<Decimal, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data
            .orphans
            .values()
            .filter(|o| &o.symbol == symbol && o.strategy_id == strategy_id && o.resolved_at.is_none())
            .map(|o| o.estimated_notional)
            .sum())
    }

    async fn get_all_positions(&self) -> Result<Vec<Position>, StoreError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data.positions.values().cloned().collect())
    }

    async fn upsert_position_snapshot(&self, position: Position) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    async fn transaction(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryStoreTransaction {
            orders: Arc::clone(&self.data),
            overlay: HashMap::new(),
        }))
    }
}

/// Scoped transaction over a `MemoryStore`'s order map.
///
/// Buffers touched orders in `overlay`, applied to the live map on
/// `commit` and discarded on `rollback` or drop.
struct MemoryStoreTransaction {
    orders: Arc<Mutex<StoreData>>,
    overlay: HashMap<String, Order>,
}

impl MemoryStoreTransaction {
    fn read_through(&self, client_order_id: &ClientOrderId) -> Option<Order> {
        if let Some(order) = self.overlay.get(client_order_id.as_str()) {
            return Some(order.clone());
        }
        let data = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        data.orders.get(client_order_id.as_str()).cloned()
    }
}

#[async_trait]
impl StoreTransaction for MemoryStoreTransaction {
    async fn get_order_for_update(
        &mut self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<Order>, StoreError> {
        let Some(order) = self.read_through(client_order_id) else {
            return Ok(None);
        };
        self.overlay.insert(client_order_id.as_str().to_string(), order.clone());
        Ok(Some(order))
    }

    async fn append_fill_to_order_metadata(
        &mut self,
        client_order_id: &ClientOrderId,
        fill: FillRecord,
    ) -> Result<Option<Order>, StoreError> {
        let Some(mut order) = self.read_through(client_order_id) else {
            return Ok(None);
        };
        if order.fills.iter().any(|f| f.fill_id == fill.fill_id) {
            return Ok(None);
        }
        order.fills.push(fill);
        self.overlay.insert(client_order_id.as_str().to_string(), order.clone());
        Ok(Some(order))
    }

    async fn recalculate_trade_realized_pnl(
        &mut self,
        _strategy_id: &str,
        _symbol: &Symbol,
        _update_all: bool,
    ) -> Result<TradesUpdated, StoreError> {
        Ok(TradesUpdated { trades_updated: 0 })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut data = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (key, order) in self.overlay {
            data.orders.insert(key, order);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FillSource, SourcePriority};
    use rust_decimal_macros::dec;

    fn base_order() -> Order {
        Order {
            client_order_id: ClientOrderId::new("co-1"),
            broker_order_id: None,
            symbol: Symbol::new("AAPL"),
            strategy_id: "s1".to_string(),
            side: "buy".to_string(),
            status: OrderStatus::New,
            source_priority: SourcePriority::Webhook,
            filled_qty: None,
            filled_avg_price: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            filled_at: None,
            fills: Vec::new(),
        }
    }

    #[tokio::test]
    async fn cas_applies_when_priority_permits() {
        let store = MemoryStore::new();
        store.insert_order(base_order());
        let now = Utc::now();
        let request = CasUpdateRequest {
            client_order_id: ClientOrderId::new("co-1"),
            status: OrderStatus::Filled,
            source_priority: SourcePriority::Reconciliation,
            filled_qty: Some(dec!(10)),
            filled_avg_price: Some(dec!(150)),
            updated_at: now,
            broker_order_id: Some(BrokerOrderId::new("b-1")),
        };
        let result = store.update_order_status_cas(request).await.unwrap();
        assert!(result.is_some());
        assert_eq!(store.get_order(&ClientOrderId::new("co-1")).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn cas_rejects_when_stored_priority_dominates() {
        let store = MemoryStore::new();
        let mut order = base_order();
        order.source_priority = SourcePriority::Manual;
        store.insert_order(order);
        let request = CasUpdateRequest {
            client_order_id: ClientOrderId::new("co-1"),
            status: OrderStatus::Filled,
            source_priority: SourcePriority::Reconciliation,
            filled_qty: None,
            filled_avg_price: None,
            updated_at: Utc::now(),
            broker_order_id: None,
        };
        let result = store.update_order_status_cas(request).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cas_rejects_terminal_order() {
        let store = MemoryStore::new();
        let mut order = base_order();
        order.status = OrderStatus::Filled;
        store.insert_order(order);
        let request = CasUpdateRequest {
            client_order_id: ClientOrderId::new("co-1"),
            status: OrderStatus::Canceled,
            source_priority: SourcePriority::Reconciliation,
            filled_qty: None,
            filled_avg_price: None,
            updated_at: Utc::now(),
            broker_order_id: None,
        };
        let result = store.update_order_status_cas(request).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn transaction_commit_applies_fill() {
        let store = MemoryStore::new();
        store.insert_order(base_order());
        let mut txn = store.transaction().await.unwrap();
        let fill = FillRecord {
            fill_id: "f1".to_string(),
            fill_qty: dec!(10),
            fill_price: dec!(150),
            realized_pl: Decimal::ZERO,
            timestamp: Utc::now(),
            synthetic: false,
            source: FillSource::AlpacaActivity,
            superseded: false,
        };
        let updated = txn
            .append_fill_to_order_metadata(&ClientOrderId::new("co-1"), fill)
            .await
            .unwrap();
        assert!(updated.is_some());
        txn.commit().await.unwrap();
        let order = store.get_order(&ClientOrderId::new("co-1")).unwrap();
        assert_eq!(order.fills.len(), 1);
    }

    #[tokio::test]
    async fn transaction_rollback_discards_fill() {
        let store = MemoryStore::new();
        store.insert_order(base_order());
        let mut txn = store.transaction().await.unwrap();
        let fill = FillRecord {
            fill_id: "f1".to_string(),
            fill_qty: dec!(10),
            fill_price: dec!(150),
            realized_pl: Decimal::ZERO,
            timestamp: Utc::now(),
            synthetic: false,
            source: FillSource::AlpacaActivity,
            superseded: false,
        };
        txn.append_fill_to_order_metadata(&ClientOrderId::new("co-1"), fill).await.unwrap();
        txn.rollback().await.unwrap();
        let order = store.get_order(&ClientOrderId::new("co-1")).unwrap();
        assert!(order.fills.is_empty());
    }

    #[tokio::test]
    async fn append_fill_is_idempotent_on_fill_id() {
        let store = MemoryStore::new();
        store.insert_order(base_order());
        let mut txn = store.transaction().await.unwrap();
        let fill = FillRecord {
            fill_id: "f1".to_string(),
            fill_qty: dec!(10),
            fill_price: dec!(150),
            realized_pl: Decimal::ZERO,
            timestamp: Utc::now(),
            synthetic: false,
            source: FillSource::AlpacaActivity,
            superseded: false,
        };
        txn.append_fill_to_order_metadata(&ClientOrderId::new("co-1"), fill.clone()).await.unwrap();
        let second = txn
            .append_fill_to_order_metadata(&ClientOrderId::new("co-1"), fill)
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
