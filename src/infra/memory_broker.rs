//! In-memory `BrokerClient` test double.
//!
//! Mirrors what a real broker adapter does — order/activity snapshots in,
//! no submission or cancellation surface — without calling out anywhere.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::ClientOrderId;
use crate::ports::{
    ActivitiesQuery, ActivityRecord, BrokerClient, BrokerError, BrokerOrderRecord,
    BrokerPositionRecord, OrdersQuery,
};

#[derive(Debug, Default)]
struct BrokerData {
    orders: Vec<BrokerOrderRecord>,
    positions: Vec<BrokerPositionRecord>,
    activities: Vec<ActivityRecord>,
}

/// In-memory reference implementation of `BrokerClient`.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    data: Mutex<BrokerData>,
}

impl MemoryBroker {
    /// Create a new, empty broker double.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order snapshot (test setup).
    pub fn add_order(&self, order: BrokerOrderRecord) {
        self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner).orders.push(order);
    }

    /// Seed a position snapshot (test setup).
    pub fn add_position(&self, position: BrokerPositionRecord) {
        self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner).positions.push(position);
    }

    /// Seed an activity record (test setup).
    pub fn add_activity(&self, activity: ActivityRecord) {
        self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner).activities.push(activity);
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn get_orders(&self, query: OrdersQuery) -> Result<Vec<BrokerOrderRecord>, BrokerError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let is_open = query.state.as_deref() == Some("open");
        Ok(data
            .orders
            .iter()
            .filter(|o| {
                if is_open {
                    return !matches!(
                        o.status.as_str(),
                        "filled" | "canceled" | "cancelled" | "expired" | "rejected" | "failed"
                    );
                }
                let touched = o.updated_at.or(o.created_at);
                match (query.after, query.until, touched) {
                    (Some(after), Some(until), Some(ts)) => ts >= after && ts <= until,
                    (Some(_) | None, Some(_) | None, None) => false,
                    _ => true,
                }
            })
            .cloned()
            .collect())
    }

    async fn get_order_by_client_id(
        &self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<BrokerOrderRecord>, BrokerError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data
            .orders
            .iter()
            .find(|o| o.client_order_id.as_deref() == Some(client_order_id.as_str()))
            .cloned())
    }

    async fn get_all_positions(&self) -> Result<Vec<BrokerPositionRecord>, BrokerError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data.positions.clone())
    }

    async fn get_account_activities(
        &self,
        query: ActivitiesQuery,
    ) -> Result<Vec<ActivityRecord>, BrokerError> {
        let data = self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut matching: Vec<ActivityRecord> = data
            .activities
            .iter()
            .filter(|a| {
                let ts = a.transaction_time.or(a.activity_time);
                ts.is_some_and(|ts| ts >= query.after && ts <= query.until)
            })
            .cloned()
            .collect();

        matching.sort_by_key(|a| std::cmp::Reverse(a.transaction_time.or(a.activity_time)));

        // A page token names the last activity of the previous page and
        // positions the next page to start there, inclusive: callers that
        // stitch pages together must dedup the boundary themselves, the
        // same way a real broker's cursor pagination behaves.
        let start = query
            .page_token
            .as_ref()
            .and_then(|token| matching.iter().position(|a| a.id == *token))
            .unwrap_or(0);
        let end = (start + query.page_size as usize).min(matching.len());
        if start >= matching.len() {
            return Ok(Vec::new());
        }
        Ok(matching[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ActivityDirection;
    use chrono::Utc;

    fn order(client_order_id: &str, status: &str) -> BrokerOrderRecord {
        BrokerOrderRecord {
            id: format!("b-{client_order_id}"),
            client_order_id: Some(client_order_id.to_string()),
            symbol: Some("AAPL".to_string()),
            side: Some("buy".to_string()),
            qty: None,
            status: status.to_string(),
            filled_qty: None,
            filled_avg_price: None,
            limit_price: None,
            notional: None,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn open_query_excludes_terminal_orders() {
        let broker = MemoryBroker::new();
        broker.add_order(order("co-1", "new"));
        broker.add_order(order("co-2", "filled"));
        let open = broker.get_orders(OrdersQuery::open()).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].client_order_id.as_deref(), Some("co-1"));
    }

    #[tokio::test]
    async fn lookup_by_client_id() {
        let broker = MemoryBroker::new();
        broker.add_order(order("co-1", "new"));
        let found = broker.get_order_by_client_id(&ClientOrderId::new("co-1")).await.unwrap();
        assert!(found.is_some());
        let missing = broker.get_order_by_client_id(&ClientOrderId::new("co-unknown")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn activities_paginate_by_token() {
        let broker = MemoryBroker::new();
        let now = Utc::now();
        for i in 0..3 {
            broker.add_activity(ActivityRecord {
                id: format!("a{i}"),
                order_id: Some("b-1".to_string()),
                symbol: Some("AAPL".to_string()),
                side: Some("buy".to_string()),
                qty: None,
                price: None,
                transaction_time: Some(now - chrono::Duration::seconds(i)),
                activity_time: None,
            });
        }
        let query = ActivitiesQuery {
            activity_type: "FILL".to_string(),
            after: now - chrono::Duration::hours(1),
            until: now,
            page_size: 2,
            page_token: None,
            direction: ActivityDirection::Desc,
        };
        let page = broker.get_account_activities(query).await.unwrap();
        assert_eq!(page.len(), 2);
    }
}
