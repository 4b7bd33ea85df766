//! The broker surface this core consumes: order, position, and account
//! activity reads. No order submission or cancellation lives here — this
//! core only reconciles, it never routes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::ClientOrderId;

/// Errors surfaced by a `BrokerClient` implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached, or returned a transport-level
    /// failure. Always treated as cycle-failing by the orchestrator.
    #[error("broker connection error: {0}")]
    Connection(String),
}

/// A broker order snapshot as returned by `GetOrders` /
/// `GetOrderByClientID`. Fields mirror what the broker actually returns;
/// absence of an optional field is meaningful (e.g. no `filled_avg_price`
/// until a fill has occurred).
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerOrderRecord {
    /// Broker-assigned order identifier.
    pub id: String,
    /// The client-assigned identifier this order was placed under, if
    /// the broker still has it on file.
    pub client_order_id: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Side, opaque passthrough.
    pub side: Option<String>,
    /// Order quantity.
    pub qty: Option<Decimal>,
    /// Raw broker status string.
    pub status: String,
    /// Cumulative filled quantity.
    pub filled_qty: Option<Decimal>,
    /// Average fill price.
    pub filled_avg_price: Option<Decimal>,
    /// Limit price, for limit orders.
    pub limit_price: Option<Decimal>,
    /// Dollar notional, for notional orders.
    pub notional: Option<Decimal>,
    /// When the broker first accepted the order.
    pub created_at: Option<DateTime<Utc>>,
    /// When the broker last updated the order.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A position snapshot as returned by `GetAllPositions`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPositionRecord {
    /// Instrument symbol.
    pub symbol: String,
    /// Signed quantity held.
    pub qty: Decimal,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Current mark price, if supplied. Passed through opaque.
    pub current_price: Option<Decimal>,
}

/// A single account activity entry (a fill), as returned by
/// `GetAccountActivities`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    /// Activity identifier, unique per broker.
    pub id: String,
    /// The broker order this activity belongs to, if known.
    pub order_id: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Side, opaque passthrough.
    pub side: Option<String>,
    /// Fill quantity.
    pub qty: Option<Decimal>,
    /// Fill price.
    pub price: Option<Decimal>,
    /// Exchange-reported transaction time.
    pub transaction_time: Option<DateTime<Utc>>,
    /// Broker-reported activity time, used when `transaction_time` is
    /// absent.
    pub activity_time: Option<DateTime<Utc>>,
}

/// Filters for `GetOrders`. All fields optional; an absent `state`
/// queries every status, absent `after`/`until` leave that bound open.
#[derive(Debug, Clone, Default)]
pub struct OrdersQuery {
    /// Broker-side status filter, e.g. `"open"`.
    pub state: Option<String>,
    /// Lower bound (inclusive) on order update time.
    pub after: Option<DateTime<Utc>>,
    /// Upper bound (inclusive) on order update time.
    pub until: Option<DateTime<Utc>>,
}

impl OrdersQuery {
    /// A query for currently-open orders, no time bound.
    #[must_use]
    pub fn open() -> Self {
        Self {
            state: Some("open".to_string()),
            after: None,
            until: None,
        }
    }

    /// A query for orders touched within `[after, until]`, any status.
    #[must_use]
    pub fn window(after: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            state: None,
            after: Some(after),
            until: Some(until),
        }
    }
}

/// Pagination direction for `GetAccountActivities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityDirection {
    /// Most recent first.
    Desc,
    /// Oldest first.
    Asc,
}

/// Parameters for a single `GetAccountActivities` page request.
#[derive(Debug, Clone)]
pub struct ActivitiesQuery {
    /// Activity type filter. This core only ever requests fills.
    pub activity_type: String,
    /// Lower bound (inclusive).
    pub after: DateTime<Utc>,
    /// Upper bound (inclusive).
    pub until: DateTime<Utc>,
    /// Page size requested.
    pub page_size: u32,
    /// Opaque continuation token from the previous page, if any.
    pub page_token: Option<String>,
    /// Sort direction.
    pub direction: ActivityDirection,
}

/// The broker surface consumed by reconciliation.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// List broker orders matching `query`.
    async fn get_orders(&self, query: OrdersQuery) -> Result<Vec<BrokerOrderRecord>, BrokerError>;

    /// Look up a single order by its client-assigned identifier.
    async fn get_order_by_client_id(
        &self,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<BrokerOrderRecord>, BrokerError>;

    /// List every open position.
    async fn get_all_positions(&self) -> Result<Vec<BrokerPositionRecord>, BrokerError>;

    /// Fetch one page of account activities.
    async fn get_account_activities(
        &self,
        query: ActivitiesQuery,
    ) -> Result<Vec<ActivityRecord>, BrokerError>;
}
