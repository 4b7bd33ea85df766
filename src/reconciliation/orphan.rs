//! Orphan detection and quarantine propagation (§4.4).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::{BrokerOrderId, NotionalInputs, Order, OrphanOrder, Symbol};
use crate::observability::record_symbol_quarantined;
use crate::ports::{
    orphan_exposure_key, quarantine_key, BrokerOrderRecord, Cache, Store, QUARANTINE_VALUE,
};

const UNTRACKED_STATUS: &str = "untracked";
/// Sentinel strategy bucket orphans are filed under.
pub const EXTERNAL_STRATEGY: &str = "external";
/// Wildcard strategy used for quarantine keys — an orphan blocks trading
/// for every strategy on the symbol, not just one.
pub const WILDCARD_STRATEGY: &str = "*";

fn is_orphan(broker_order: &BrokerOrderRecord, known_client_order_ids: &HashSet<String>) -> bool {
    match broker_order.client_order_id.as_ref() {
        None => true,
        Some(id) if id.is_empty() => true,
        Some(id) => !known_client_order_ids.contains(id),
    }
}

/// Scan both sweeps for broker orders with no corresponding local
/// record, handling each as an orphan. Returns the number handled.
pub async fn detect_orphans(
    store: &dyn Store,
    cache: &dyn Cache,
    pod: &str,
    open: &[BrokerOrderRecord],
    recent: &[BrokerOrderRecord],
    known_client_order_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> usize {
    let mut handled = 0;
    for order in open.iter().filter(|o| is_orphan(o, known_client_order_ids)) {
        if handle_orphan(store, cache, pod, order, false, now).await {
            handled += 1;
        }
    }
    for order in recent.iter().filter(|o| is_orphan(o, known_client_order_ids)) {
        if handle_orphan(store, cache, pod, order, true, now).await {
            handled += 1;
        }
    }
    handled
}

/// Record a single orphan: persist it, set the wildcard quarantine, and
/// sync exposure. Orphan-record persistence happens first and
/// unconditionally; quarantine and exposure sync are best-effort and
/// fail closed — any error there is logged and swallowed, since an
/// independent quarantine check on the order-submission path (outside
/// this core) still blocks trading even if the cache write is lost.
pub async fn handle_orphan(
    store: &dyn Store,
    cache: &dyn Cache,
    pod: &str,
    broker_order: &BrokerOrderRecord,
    resolve_terminal: bool,
    now: DateTime<Utc>,
) -> bool {
    let Some(symbol_str) = broker_order.symbol.clone() else {
        return false;
    };
    if broker_order.id.is_empty() {
        return false;
    }

    let status = if broker_order.status.is_empty() {
        UNTRACKED_STATUS.to_string()
    } else {
        broker_order.status.clone()
    };
    let broker_order_id = BrokerOrderId::new(broker_order.id.clone());
    let symbol = Symbol::new(symbol_str.clone());

    let estimated_notional = NotionalInputs {
        notional: broker_order.notional,
        qty: broker_order.qty,
        limit_price: broker_order.limit_price,
        filled_avg_price: broker_order.filled_avg_price,
    }
    .estimate();

    let orphan = OrphanOrder {
        broker_order_id: broker_order_id.clone(),
        symbol: symbol.clone(),
        strategy_id: EXTERNAL_STRATEGY.to_string(),
        side: broker_order.side.clone().unwrap_or_default(),
        status: status.clone(),
        estimated_notional,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };

    if let Err(err) = store.create_orphan_order(orphan).await {
        warn!(broker_order_id = %broker_order_id, error = %err, "failed to persist orphan order");
        return false;
    }

    let resolved_at = if resolve_terminal && crate::domain::OrderStatus::is_terminal_str(&status) {
        Some(now)
    } else {
        None
    };
    if let Err(err) = store
        .update_orphan_order_status(&broker_order_id, &status, resolved_at)
        .await
    {
        warn!(broker_order_id = %broker_order_id, error = %err, "failed to update orphan order status");
    }

    if let Err(err) = cache
        .set(&quarantine_key(WILDCARD_STRATEGY, symbol.as_str()), QUARANTINE_VALUE)
        .await
    {
        warn!(symbol = %symbol, error = %err, "failed to set quarantine key; relying on fail-closed submission check");
    }

    sync_orphan_exposure(store, cache, &symbol).await;

    record_symbol_quarantined(pod, symbol.as_str());
    true
}

async fn sync_orphan_exposure(store: &dyn Store, cache: &dyn Cache, symbol: &Symbol) {
    let exposure = match store.get_orphan_exposure(symbol, EXTERNAL_STRATEGY).await {
        Ok(value) => value,
        Err(err) => {
            warn!(symbol = %symbol, error = %err, "failed to read orphan exposure");
            return;
        }
    };
    if let Err(err) = cache
        .set(&orphan_exposure_key(EXTERNAL_STRATEGY, symbol.as_str()), &exposure.to_string())
        .await
    {
        warn!(symbol = %symbol, error = %err, "failed to sync orphan exposure to cache");
    }
}

/// `known_client_order_ids` that `detect_orphans`/`is_orphan` consult are
/// drawn from the merged broker sweep, not local DB state directly; this
/// wrapper extracts them so callers in the orchestrator have one place
/// to build the set from a merge result.
#[must_use]
pub fn known_client_order_ids_from_orders(orders: &[Order]) -> HashSet<String> {
    orders.iter().map(|o| o.client_order_id.as_str().to_string()).collect()
}
