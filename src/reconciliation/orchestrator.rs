//! The reconciliation cycle and its periodic/startup drivers (§4.2, §5).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::domain::{ClientOrderId, CycleStatus, OrderStatus, ReconciliationResult, ReconciliationState};
use crate::ports::{BrokerClient, Cache, OrdersQuery, Store};
use crate::reconciliation::cas::{apply_broker_update, warrants_fill_backfill, CasDisposition};
use crate::reconciliation::config::ReconciliationConfig;
use crate::reconciliation::error::ReconciliationError;
use crate::reconciliation::fills::{
    backfill_alpaca_fills, backfill_from_broker_order, backfill_missing_fills_scan, AlpacaBackfillResult,
};
use crate::reconciliation::merge::merge;
use crate::reconciliation::missing_orders::{reconcile_missing_orders, MissingOrdersOutcome};
use crate::reconciliation::orphan::detect_orphans;
use crate::reconciliation::positions::{reconcile_positions, PositionReconciliationResult};

/// Aggregate counts produced by one completed reconciliation cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Orders whose CAS write was applied.
    pub applied_updates: usize,
    /// Orders whose CAS write was rejected (not an error).
    pub conflicts_skipped: usize,
    /// Outcome of the missing-orders grace policy.
    pub missing_orders: MissingOrdersOutcome,
    /// Orphan broker orders detected and handled this cycle.
    pub orphans_handled: usize,
    /// Orders backfilled by the bulk filled-orders-missing-fills scan.
    pub fills_backfilled: usize,
    /// Result of the optional broker-activity fill backfill.
    pub alpaca_backfill: Option<AlpacaBackfillResult>,
    /// Result of broker-authoritative position reconciliation.
    pub positions: PositionReconciliationResult,
}

/// Wires a `BrokerClient`, `Store`, and `Cache` into the reconciliation
/// cycle and its periodic/startup drivers.
///
/// Holds the single non-reentrant reconciliation mutex: `run_once` and
/// the fill-backfill entry point it wraps cannot interleave, so startup
/// and periodic runs always serialize.
pub struct ReconciliationService {
    broker: Arc<dyn BrokerClient>,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    config: ReconciliationConfig,
    state: Arc<ReconciliationState>,
    pod: String,
    cycle_mutex: Mutex<()>,
}

impl ReconciliationService {
    /// Build a new service over the given adapters and configuration.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        config: ReconciliationConfig,
        state: Arc<ReconciliationState>,
        pod: String,
    ) -> Self {
        Self {
            broker,
            store,
            cache,
            config,
            state,
            pod,
            cycle_mutex: Mutex::new(()),
        }
    }

    /// The process-wide lifecycle/state singleton backing this service.
    #[must_use]
    pub fn state(&self) -> Arc<ReconciliationState> {
        Arc::clone(&self.state)
    }

    /// Run one reconciliation cycle under the reconciliation mutex,
    /// bounded by `config.timeout_seconds`. Always records a
    /// `ReconciliationResult`, success or failure, before returning.
    pub async fn run_reconciliation_once(&self, mode: &str) -> Result<CycleReport, ReconciliationError> {
        let _guard = self.cycle_mutex.lock().await;
        let now = Utc::now();

        if self.config.dry_run {
            info!(mode, "dry_run enabled; skipping reconciliation cycle, no writes performed");
            self.state.record_reconciliation_result(ReconciliationResult {
                status: CycleStatus::Success,
                error: None,
                mode: mode.to_string(),
                timestamp: now,
            });
            if !self.state.is_startup_complete() {
                let _ = self.state.mark_startup_complete(false, "", "", now);
            }
            return Ok(CycleReport {
                applied_updates: 0,
                conflicts_skipped: 0,
                missing_orders: MissingOrdersOutcome::default(),
                orphans_handled: 0,
                fills_backfilled: 0,
                alpaca_backfill: None,
                positions: PositionReconciliationResult { updated: 0, flattened: 0 },
            });
        }

        let bound = StdDuration::from_secs_f64(self.config.timeout_seconds.max(0.0));
        let outcome = tokio::time::timeout(bound, self.run_cycle_body(now)).await;

        match outcome {
            Ok(Ok(report)) => {
                self.state.record_reconciliation_result(ReconciliationResult {
                    status: CycleStatus::Success,
                    error: None,
                    mode: mode.to_string(),
                    timestamp: now,
                });
                if !self.state.is_startup_complete() {
                    // unforced completion never fails; see InvalidBypassError variants.
                    let _ = self.state.mark_startup_complete(false, "", "", now);
                }
                info!(mode, applied = report.applied_updates, conflicts = report.conflicts_skipped, "reconciliation cycle succeeded");
                Ok(report)
            }
            Ok(Err(err)) => {
                self.state.record_reconciliation_result(ReconciliationResult {
                    status: CycleStatus::Failed,
                    error: Some(err.to_string()),
                    mode: mode.to_string(),
                    timestamp: now,
                });
                error!(mode, error = %err, "reconciliation cycle failed");
                Err(err)
            }
            Err(_elapsed) => {
                let err = ReconciliationError::Timeout(self.config.timeout_seconds);
                self.state.record_reconciliation_result(ReconciliationResult {
                    status: CycleStatus::Failed,
                    error: Some(err.to_string()),
                    mode: mode.to_string(),
                    timestamp: now,
                });
                error!(mode, timeout_seconds = self.config.timeout_seconds, "reconciliation cycle timed out");
                Err(err)
            }
        }
    }

    async fn run_cycle_body(&self, now: DateTime<Utc>) -> Result<CycleReport, ReconciliationError> {
        let reconciliation_hwm = self.store.get_high_water_mark("reconciliation").await?;
        let after = reconciliation_hwm.map(|hwm| hwm - Duration::seconds(self.config.overlap_seconds));

        let open_orders = self.broker.get_orders(OrdersQuery::open()).await?;
        let recent = if let Some(after_ts) = after {
            self.broker.get_orders(OrdersQuery::window(after_ts, now)).await?
        } else {
            Vec::new()
        };

        let merged = merge(&open_orders, &recent);

        let db_orders = self.store.get_non_terminal_orders().await?;
        let local_by_client_order_id: std::collections::HashMap<&str, &crate::domain::Order> =
            db_orders.iter().map(|o| (o.client_order_id.as_str(), o)).collect();
        let merged_ids: Vec<ClientOrderId> = merged.keys().map(|id| ClientOrderId::new(id.clone())).collect();
        let known_client_order_ids = self.store.get_order_ids_by_client_ids(&merged_ids).await?;

        let mut applied_updates = 0;
        let mut conflicts_skipped = 0;
        for (client_order_id_str, broker_order) in &merged {
            if !known_client_order_ids.iter().any(|id| id.as_str() == client_order_id_str) {
                continue;
            }
            let client_order_id = ClientOrderId::new(client_order_id_str.clone());
            let local_order = local_by_client_order_id.get(client_order_id_str.as_str()).copied();
            match apply_broker_update(self.store.as_ref(), &self.pod, &client_order_id, broker_order, local_order, now).await? {
                CasDisposition::Applied(_) => {
                    applied_updates += 1;
                    let status = OrderStatus::parse_broker_status(&broker_order.status);
                    if warrants_fill_backfill(status) {
                        backfill_from_broker_order(self.store.as_ref(), &client_order_id, broker_order, now).await;
                    }
                }
                CasDisposition::Conflict => conflicts_skipped += 1,
            }
        }

        let merged_client_order_ids: std::collections::HashSet<String> = merged.keys().cloned().collect();
        let missing_orders = reconcile_missing_orders(
            self.broker.as_ref(),
            self.store.as_ref(),
            &self.pod,
            &db_orders,
            &merged_client_order_ids,
            after,
            now,
            self.config.submitted_unconfirmed_grace_seconds,
            self.config.max_individual_lookups,
        )
        .await?;

        // `knownClientIDs` here is the store-confirmed subset of merged
        // client_order_ids (step 7), not every id seen in the sweep: a
        // broker order whose client_order_id the store doesn't recognize
        // is exactly what makes it an orphan.
        let known_client_order_id_strings: std::collections::HashSet<String> =
            known_client_order_ids.iter().map(|id| id.as_str().to_string()).collect();
        let orphans_handled = detect_orphans(
            self.store.as_ref(),
            self.cache.as_ref(),
            &self.pod,
            &open_orders,
            &recent,
            &known_client_order_id_strings,
            now,
        )
        .await;

        let fills_backfilled = backfill_missing_fills_scan(self.store.as_ref(), 200, now).await;

        let alpaca_backfill = if self.config.fills_backfill_enabled {
            Some(
                backfill_alpaca_fills(
                    self.broker.as_ref(),
                    self.store.as_ref(),
                    &self.config,
                    None,
                    false,
                    now,
                )
                .await?,
            )
        } else {
            None
        };

        let positions = reconcile_positions(self.broker.as_ref(), self.store.as_ref(), now).await?;

        self.store.set_high_water_mark("reconciliation", now).await?;

        Ok(CycleReport {
            applied_updates,
            conflicts_skipped,
            missing_orders,
            orphans_handled,
            fills_backfilled,
            alpaca_backfill,
            positions,
        })
    }

    /// Run the startup reconciliation cycle. On success this is the
    /// normal path by which the startup gate opens.
    pub async fn run_startup_reconciliation(&self) -> Result<CycleReport, ReconciliationError> {
        self.state.mark_startup_started(Utc::now());
        self.run_reconciliation_once("startup").await
    }

    /// Run forever, sleeping `poll_interval_seconds` between cycles,
    /// until `cancel` fires or `state.stop()` is called. Broker, store,
    /// and validation errors are logged and recorded in state rather
    /// than propagated; the loop only stops on cancellation.
    pub async fn run_periodic_loop(&self, mut cancel: broadcast::Receiver<()>) {
        let interval = StdDuration::from_secs(self.config.poll_interval_seconds);
        loop {
            if self.state.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.recv() => break,
                () = tokio::time::sleep(interval) => {}
            }
            if self.state.is_cancelled() {
                break;
            }
            if let Err(err) = self.run_reconciliation_once("periodic").await {
                warn!(error = %err, "periodic reconciliation cycle failed; will retry next interval");
            }
        }
        info!("periodic reconciliation loop stopped");
    }
}
