//! Grace-period policy for locally tracked orders absent from the merged
//! broker sweep (§4.3c).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{Order, OrderStatus, SourcePriority};
use crate::observability::record_conflict_skipped;
use crate::ports::{BrokerClient, CasUpdateRequest, Store};
use crate::reconciliation::cas::{apply_broker_update, CasDisposition};
use crate::reconciliation::error::ReconciliationError;

/// Counts produced by a single `reconcile_missing_orders` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingOrdersOutcome {
    /// Orders escalated to `failed` after exceeding their grace window.
    pub escalated_to_failed: usize,
    /// Orders updated after an individual lookup found them at the broker.
    pub applied_updates: usize,
    /// Individual `get_order_by_client_id` calls made this cycle.
    pub lookups_used: usize,
}

/// Walk locally tracked non-terminal orders that did not appear in the
/// merged broker sweep, applying the grace policy described in §4.3c.
///
/// `max_individual_lookups` bounds the number of direct broker lookups
/// performed across both branches; once the cap is reached, remaining
/// candidates are left for the next cycle.
pub async fn reconcile_missing_orders(
    broker: &dyn BrokerClient,
    store: &dyn Store,
    pod: &str,
    local_orders: &[Order],
    known_client_order_ids: &HashSet<String>,
    after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace_seconds: i64,
    max_individual_lookups: usize,
) -> Result<MissingOrdersOutcome, ReconciliationError> {
    let mut outcome = MissingOrdersOutcome::default();

    for order in local_orders {
        if known_client_order_ids.contains(order.client_order_id.as_str()) {
            continue;
        }
        if outcome.lookups_used >= max_individual_lookups {
            debug!("max_individual_lookups reached; remaining orders deferred to next cycle");
            break;
        }

        if order.status == OrderStatus::SubmittedUnconfirmed {
            let age_seconds = (now - order.created_at).num_seconds();
            if age_seconds <= grace_seconds {
                continue;
            }

            outcome.lookups_used += 1;
            match broker.get_order_by_client_id(&order.client_order_id).await? {
                None => {
                    let request = CasUpdateRequest {
                        client_order_id: order.client_order_id.clone(),
                        status: OrderStatus::Failed,
                        source_priority: SourcePriority::Reconciliation,
                        filled_qty: order.filled_qty,
                        filled_avg_price: order.filled_avg_price,
                        updated_at: now,
                        broker_order_id: order.broker_order_id.clone(),
                    };
                    match store.update_order_status_cas(request).await? {
                        Some(_) => {
                            warn!(
                                client_order_id = %order.client_order_id,
                                age_seconds,
                                "escalated submitted_unconfirmed order to failed past grace window"
                            );
                            outcome.escalated_to_failed += 1;
                        }
                        None => record_conflict_skipped(pod, "stale_source_priority_or_terminal"),
                    }
                }
                Some(broker_order) => {
                    if let CasDisposition::Applied(_) =
                        apply_broker_update(store, pod, &order.client_order_id, &broker_order, Some(order), now).await?
                    {
                        outcome.applied_updates += 1;
                    }
                }
            }
            continue;
        }

        if let Some(after_ts) = after {
            if order.created_at >= after_ts {
                continue;
            }
        }

        outcome.lookups_used += 1;
        if let Some(broker_order) = broker.get_order_by_client_id(&order.client_order_id).await? {
            if let CasDisposition::Applied(_) =
                apply_broker_update(store, pod, &order.client_order_id, &broker_order, Some(order), now).await?
            {
                outcome.applied_updates += 1;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_defaults_to_zero() {
        let outcome = MissingOrdersOutcome::default();
        assert_eq!(outcome.escalated_to_failed, 0);
        assert_eq!(outcome.applied_updates, 0);
        assert_eq!(outcome.lookups_used, 0);
    }
}
