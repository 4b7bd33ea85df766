//! Synthetic fill arithmetic and the three fill-backfill flows (§4.5).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::{ClientOrderId, FillRecord, FillSource, Order};
use crate::ports::{
    ActivitiesQuery, ActivityDirection, ActivityRecord, BrokerClient, BrokerOrderId,
    BrokerOrderRecord, Store, StoreError,
};
use crate::reconciliation::config::ReconciliationConfig;
use crate::reconciliation::error::ReconciliationError;

/// Which flow produced a synthetic fill. Distinct from `FillSource`: this
/// feeds the deterministic `FillID`, which uses the original short
/// tokens rather than the longer `FillSource` variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticOrigin {
    /// Computed from a broker order snapshot.
    Reconciliation,
    /// Computed from the locally recorded order.
    ReconciliationDb,
}

impl SyntheticOrigin {
    const fn id_token(self) -> &'static str {
        match self {
            Self::Reconciliation => "recon",
            Self::ReconciliationDb => "recon_db",
        }
    }

    const fn fill_source(self) -> FillSource {
        match self {
            Self::Reconciliation => FillSource::ReconciliationBackfill,
            Self::ReconciliationDb => FillSource::ReconciliationDbBackfill,
        }
    }
}

/// Compute the synthetic fill needed to cover the gap between a broker's
/// view of an order's filled quantity and what this core has recorded,
/// or `None` if there is no positive gap.
#[must_use]
pub fn compute_synthetic_fill(
    client_order_id: &ClientOrderId,
    broker_filled_qty: Decimal,
    broker_filled_avg_price: Option<Decimal>,
    now: DateTime<Utc>,
    existing_fills: &[FillRecord],
    origin: SyntheticOrigin,
) -> Option<FillRecord> {
    let real_sum: Decimal = existing_fills
        .iter()
        .filter(|f| !f.synthetic && !f.superseded)
        .map(|f| f.fill_qty)
        .sum();
    let synthetic_sum: Decimal = existing_fills
        .iter()
        .filter(|f| f.synthetic && !f.superseded)
        .map(|f| f.fill_qty)
        .sum();

    if broker_filled_qty <= real_sum {
        return None;
    }
    let missing = broker_filled_qty - real_sum - synthetic_sum;
    if missing <= Decimal::ZERO {
        return None;
    }

    let fill_id = format!(
        "{client_order_id}_{}_{broker_filled_qty}_{missing}",
        origin.id_token()
    )
    .replace('.', "_");

    Some(FillRecord {
        fill_id,
        fill_qty: missing,
        fill_price: broker_filled_avg_price.unwrap_or(Decimal::ZERO),
        realized_pl: Decimal::ZERO,
        timestamp: now,
        synthetic: true,
        source: origin.fill_source(),
        superseded: false,
    })
}

async fn backfill_one(
    store: &dyn Store,
    client_order_id: &ClientOrderId,
    broker_filled_qty: Decimal,
    broker_filled_avg_price: Decimal,
    timestamp: DateTime<Utc>,
    origin: SyntheticOrigin,
) -> Result<bool, StoreError> {
    let mut txn = store.transaction().await?;
    let Some(order) = txn.get_order_for_update(client_order_id).await? else {
        txn.rollback().await?;
        return Ok(false);
    };
    let Some(fill) = compute_synthetic_fill(
        client_order_id,
        broker_filled_qty,
        Some(broker_filled_avg_price),
        timestamp,
        &order.fills,
        origin,
    ) else {
        txn.commit().await?;
        return Ok(false);
    };
    txn.append_fill_to_order_metadata(client_order_id, fill).await?;
    txn.commit().await?;
    Ok(true)
}

/// Backfill a missing fill from a broker order snapshot. Skips (returns
/// `false`) when the broker hasn't reported an average fill price yet,
/// when the order isn't found locally, or when there's no gap to cover.
/// Any store error inside the transaction is logged and swallowed.
pub async fn backfill_from_broker_order(
    store: &dyn Store,
    client_order_id: &ClientOrderId,
    broker_order: &BrokerOrderRecord,
    now: DateTime<Utc>,
) -> bool {
    let (Some(filled_qty), Some(filled_avg_price)) =
        (broker_order.filled_qty, broker_order.filled_avg_price)
    else {
        return false;
    };
    let timestamp = broker_order.updated_at.or(broker_order.created_at).unwrap_or(now);

    match backfill_one(
        store,
        client_order_id,
        filled_qty,
        filled_avg_price,
        timestamp,
        SyntheticOrigin::Reconciliation,
    )
    .await
    {
        Ok(applied) => applied,
        Err(err) => {
            warn!(client_order_id = %client_order_id, error = %err, "broker-order fill backfill failed");
            false
        }
    }
}

/// Backfill a missing fill from the locally recorded order's own
/// `filled_qty`/`filled_avg_price`, used by the bulk scan.
pub async fn backfill_from_db_order(store: &dyn Store, order: &Order, now: DateTime<Utc>) -> bool {
    let (Some(filled_qty), Some(filled_avg_price)) = (order.filled_qty, order.filled_avg_price)
    else {
        return false;
    };
    let timestamp = order.filled_at.or(Some(order.updated_at)).unwrap_or(now);

    match backfill_one(
        store,
        &order.client_order_id,
        filled_qty,
        filled_avg_price,
        timestamp,
        SyntheticOrigin::ReconciliationDb,
    )
    .await
    {
        Ok(applied) => applied,
        Err(err) => {
            warn!(client_order_id = %order.client_order_id, error = %err, "db-order fill backfill failed");
            false
        }
    }
}

/// Scan filled orders missing a fill record and backfill each. Returns
/// the number of orders successfully backfilled; a failure to list
/// candidates is logged and reported as zero rather than failing the
/// cycle.
pub async fn backfill_missing_fills_scan(store: &dyn Store, limit: usize, now: DateTime<Utc>) -> usize {
    let orders = match store.get_filled_orders_missing_fills(limit).await {
        Ok(orders) => orders,
        Err(err) => {
            warn!(error = %err, "failed to list filled orders missing fills");
            return 0;
        }
    };

    let mut backfilled = 0;
    for order in &orders {
        if backfill_from_db_order(store, order, now).await {
            backfilled += 1;
        }
    }
    backfilled
}

/// Outcome of a single `backfill_alpaca_fills` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlpacaBackfillResult {
    /// `"disabled"` when the feature flag is off and no explicit lookback
    /// was requested, `"ok"` otherwise.
    pub status: String,
    /// Total unique activities retrieved across all pages.
    pub fills_seen: usize,
    /// Activities successfully appended as fills.
    pub fills_inserted: usize,
    /// Activities with no `order_id`, or whose order isn't tracked locally.
    pub unmatched: usize,
    /// `(strategy_id, symbol)` pairs whose realized P&L was recalculated.
    pub pnl_updates: usize,
    /// Recalculations that failed (always 0 on success: any failure
    /// rolls back the whole transaction and fails the cycle instead).
    pub pnl_failures: usize,
    /// Window start used for this run.
    pub after: Option<DateTime<Utc>>,
    /// Window end used for this run.
    pub until: Option<DateTime<Utc>>,
}

impl AlpacaBackfillResult {
    fn disabled() -> Self {
        Self {
            status: "disabled".to_string(),
            fills_seen: 0,
            fills_inserted: 0,
            unmatched: 0,
            pnl_updates: 0,
            pnl_failures: 0,
            after: None,
            until: None,
        }
    }
}

fn sha256_fallback_id(parts: &[(&str, String)]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("|");
    let digest = Sha256::digest(joined.as_bytes());
    format!("{digest:x}")[..32].to_string()
}

fn activity_fill_id(activity: &ActivityRecord, broker_order_id: &str) -> String {
    if !activity.id.is_empty() {
        return activity.id.clone();
    }
    sha256_fallback_id(&[
        ("broker_order_id", broker_order_id.to_string()),
        ("symbol", activity.symbol.clone().unwrap_or_default()),
        ("side", activity.side.clone().unwrap_or_default()),
        ("qty", activity.qty.map_or_else(String::new, |q| q.to_string())),
        ("price", activity.price.map_or_else(String::new, |p| p.to_string())),
        (
            "transaction_time",
            activity.transaction_time.map_or_else(String::new, |t| t.to_rfc3339()),
        ),
        (
            "activity_time",
            activity.activity_time.map_or_else(String::new, |t| t.to_rfc3339()),
        ),
        ("id_hint", activity.id.clone()),
    ])
}

async fn fetch_activities_paginated(
    broker: &dyn BrokerClient,
    config: &ReconciliationConfig,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<ActivityRecord>, ReconciliationError> {
    let mut activities = Vec::new();
    let mut last_activity_id: Option<String> = None;
    let mut page_token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        if pages >= config.fills_backfill_max_pages {
            break;
        }
        let requested = config.fills_backfill_page_size + u32::from(page_token.is_some());
        let query = ActivitiesQuery {
            activity_type: "FILL".to_string(),
            after,
            until,
            page_size: requested,
            page_token: page_token.clone(),
            direction: ActivityDirection::Desc,
        };
        let raw_page = broker.get_account_activities(query).await?;
        if raw_page.is_empty() {
            break;
        }
        let returned_count = raw_page.len() as u32;
        let last_id_this_page = raw_page.last().map(|a| a.id.clone());

        let mut page = raw_page;
        if pages > 0 {
            if let Some(last_id) = &last_activity_id {
                page.retain(|a| &a.id != last_id);
            }
        }
        activities.extend(page);
        pages += 1;

        if returned_count < requested {
            break;
        }
        match last_id_this_page {
            None => break,
            Some(id) => {
                page_token = Some(id.clone());
                last_activity_id = Some(id);
            }
        }
    }

    Ok(activities)
}

/// Pull fills from the broker's account-activities API, matching each to
/// a locally tracked order and appending it, then recalculating realized
/// P&L for every affected `(strategy_id, symbol)` pair.
///
/// `lookback_hours` forces an explicit window (used for manual re-runs);
/// when absent, the feature flag gates whether this runs at all.
pub async fn backfill_alpaca_fills(
    broker: &dyn BrokerClient,
    store: &dyn Store,
    config: &ReconciliationConfig,
    lookback_hours: Option<i64>,
    recalc_all_trades: bool,
    now: DateTime<Utc>,
) -> Result<AlpacaBackfillResult, ReconciliationError> {
    if !config.fills_backfill_enabled && lookback_hours.is_none() {
        return Ok(AlpacaBackfillResult::disabled());
    }

    let after = if let Some(hours) = lookback_hours {
        now - Duration::hours(hours)
    } else if let Some(hwm) = store.get_high_water_mark("alpaca_fills").await? {
        hwm - Duration::seconds(config.overlap_seconds)
    } else {
        now - Duration::hours(config.fills_backfill_initial_lookback_hours)
    };
    let until = now;

    let activities = fetch_activities_paginated(broker, config, after, until).await?;
    let fills_seen = activities.len();

    if activities.is_empty() {
        store.set_high_water_mark("alpaca_fills", now).await?;
        return Ok(AlpacaBackfillResult {
            status: "ok".to_string(),
            fills_seen: 0,
            fills_inserted: 0,
            unmatched: 0,
            pnl_updates: 0,
            pnl_failures: 0,
            after: Some(after),
            until: Some(until),
        });
    }

    let broker_order_ids: Vec<BrokerOrderId> = activities
        .iter()
        .filter_map(|a| a.order_id.as_ref())
        .filter(|id| !id.is_empty())
        .map(|id| BrokerOrderId::new(id.clone()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let matched_orders = store.get_orders_by_broker_ids(&broker_order_ids).await?;
    let orders_by_broker_id: HashMap<String, &Order> = matched_orders
        .iter()
        .filter_map(|o| o.broker_order_id.as_ref().map(|id| (id.as_str().to_string(), o)))
        .collect();

    let mut unmatched = 0;
    let mut fills_by_order: HashMap<ClientOrderId, Vec<FillRecord>> = HashMap::new();
    let mut affected_pairs: HashSet<(String, crate::domain::Symbol)> = HashSet::new();

    for activity in &activities {
        let Some(order_id) = activity.order_id.as_ref().filter(|id| !id.is_empty()) else {
            unmatched += 1;
            continue;
        };
        let Some(order) = orders_by_broker_id.get(order_id) else {
            unmatched += 1;
            continue;
        };

        let fill = FillRecord {
            fill_id: activity_fill_id(activity, order_id),
            fill_qty: activity.qty.unwrap_or(Decimal::ZERO),
            fill_price: activity.price.unwrap_or(Decimal::ZERO),
            realized_pl: Decimal::ZERO,
            timestamp: activity.transaction_time.or(activity.activity_time).unwrap_or(now),
            synthetic: false,
            source: FillSource::AlpacaActivity,
            superseded: false,
        };

        affected_pairs.insert((order.strategy_id.clone(), order.symbol.clone()));
        fills_by_order.entry(order.client_order_id.clone()).or_default().push(fill);
    }

    let mut fills_inserted = 0;
    let mut txn = store.transaction().await?;
    for (client_order_id, fills) in fills_by_order {
        for fill in fills {
            match txn.append_fill_to_order_metadata(&client_order_id, fill).await {
                Ok(Some(_)) => fills_inserted += 1,
                Ok(None) => {}
                Err(err) => {
                    txn.rollback().await?;
                    return Err(ReconciliationError::Store(err.to_string()));
                }
            }
        }
    }

    let mut pnl_updates = 0;
    for (strategy_id, symbol) in &affected_pairs {
        match txn
            .recalculate_trade_realized_pnl(strategy_id, symbol, recalc_all_trades)
            .await
        {
            Ok(_) => pnl_updates += 1,
            Err(err) => {
                txn.rollback().await?;
                return Err(ReconciliationError::Recalculation {
                    scope: format!("{strategy_id}:{symbol}"),
                    source: err,
                });
            }
        }
    }

    txn.commit().await?;
    store.set_high_water_mark("alpaca_fills", now).await?;

    Ok(AlpacaBackfillResult {
        status: "ok".to_string(),
        fills_seen,
        fills_inserted,
        unmatched,
        pnl_updates,
        pnl_failures: 0,
        after: Some(after),
        until: Some(until),
    })
}
