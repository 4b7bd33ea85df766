//! Compare-and-swap order status application (§4.3b).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{BrokerOrderId, ClientOrderId, Order, OrderStatus, SourcePriority};
use crate::observability::{record_conflict_skipped, record_mismatch};
use crate::ports::{BrokerOrderRecord, CasUpdateRequest, Store};
use crate::reconciliation::error::ReconciliationError;

/// The disposition of a single `apply_broker_update` call.
#[derive(Debug, Clone, PartialEq)]
pub enum CasDisposition {
    /// The store applied the write; the order now reflects `status`.
    Applied(Order),
    /// The store rejected the write: a dominant source priority or a
    /// terminal/newer row already held it. Not an error.
    Conflict,
}

/// Apply a broker-observed order snapshot to the store under CAS.
///
/// `local_order` is this core's last-known row for `client_order_id`, if
/// any, used only to detect and record a fill-quantity mismatch against
/// the broker's view before the write lands.
///
/// Returns `Conflict` (not an error) when the store's compare-and-swap
/// condition isn't met — on conflict the caller takes no further action
/// beyond the metric increment this function performs.
pub async fn apply_broker_update(
    store: &dyn Store,
    pod: &str,
    client_order_id: &ClientOrderId,
    broker_order: &BrokerOrderRecord,
    local_order: Option<&Order>,
    now: DateTime<Utc>,
) -> Result<CasDisposition, ReconciliationError> {
    let status = OrderStatus::parse_broker_status(&broker_order.status);
    let updated_at = broker_order.updated_at.or(broker_order.created_at).unwrap_or(now);

    if let Some(local) = local_order {
        if is_mismatch(local.filled_qty, broker_order.filled_qty) {
            record_mismatch(pod, local.symbol.as_str(), &local.strategy_id);
        }
    }

    let request = CasUpdateRequest {
        client_order_id: client_order_id.clone(),
        status,
        source_priority: SourcePriority::Reconciliation,
        filled_qty: broker_order.filled_qty,
        filled_avg_price: broker_order.filled_avg_price,
        updated_at,
        broker_order_id: Some(BrokerOrderId::new(broker_order.id.clone())),
    };

    match store.update_order_status_cas(request).await? {
        Some(order) => {
            debug!(
                client_order_id = %client_order_id,
                status = ?status,
                "applied broker update via CAS"
            );
            Ok(CasDisposition::Applied(order))
        }
        None => {
            warn!(client_order_id = %client_order_id, "CAS rejected broker update");
            record_conflict_skipped(pod, "stale_source_priority_or_terminal");
            Ok(CasDisposition::Conflict)
        }
    }
}

/// Whether a just-applied status warrants a fill-backfill callback.
#[must_use]
pub fn warrants_fill_backfill(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::PartiallyFilled | OrderStatus::Filled)
}

/// Whether `filled_qty` represents progress worth logging as a mismatch
/// against what this core last recorded for the order.
#[must_use]
pub fn is_mismatch(local_filled_qty: Option<Decimal>, broker_filled_qty: Option<Decimal>) -> bool {
    match (local_filled_qty, broker_filled_qty) {
        (Some(local), Some(broker)) => local != broker,
        (None, Some(broker)) => broker != Decimal::ZERO,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fill_backfill_only_for_progress_statuses() {
        assert!(warrants_fill_backfill(OrderStatus::Filled));
        assert!(warrants_fill_backfill(OrderStatus::PartiallyFilled));
        assert!(!warrants_fill_backfill(OrderStatus::New));
        assert!(!warrants_fill_backfill(OrderStatus::Canceled));
    }

    #[test]
    fn mismatch_detection() {
        assert!(is_mismatch(Some(dec!(10)), Some(dec!(15))));
        assert!(!is_mismatch(Some(dec!(10)), Some(dec!(10))));
        assert!(!is_mismatch(None, None));
        assert!(is_mismatch(None, Some(dec!(5))));
        assert!(!is_mismatch(None, Some(Decimal::ZERO)));
    }
}
