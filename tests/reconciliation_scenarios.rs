//! End-to-end scenarios against the in-memory reference adapters.

use std::sync::Arc;

use chrono::{Duration, Utc};
use reconciliation_core::infra::{MemoryBroker, MemoryCache, MemoryStore};
use reconciliation_core::{
    ActivityRecord, BrokerOrderId, BrokerOrderRecord, ClientOrderId, CycleStatus,
    InvalidBypassError, Order, OrderStatus, ReconciliationConfig, ReconciliationResult,
    ReconciliationService, ReconciliationState, SourcePriority, Store, Symbol,
};
use rust_decimal_macros::dec;

fn local_order(client_order_id: &str, status: OrderStatus) -> Order {
    let now = Utc::now();
    Order {
        client_order_id: ClientOrderId::new(client_order_id),
        broker_order_id: None,
        symbol: Symbol::new("AAPL"),
        strategy_id: "momentum".to_string(),
        side: "buy".to_string(),
        status,
        source_priority: SourcePriority::Webhook,
        filled_qty: None,
        filled_avg_price: None,
        created_at: now,
        updated_at: now,
        filled_at: None,
        fills: Vec::new(),
    }
}

fn broker_order(
    id: &str,
    client_order_id: &str,
    status: &str,
    filled_qty: Option<rust_decimal::Decimal>,
    filled_avg_price: Option<rust_decimal::Decimal>,
) -> BrokerOrderRecord {
    let now = Utc::now();
    BrokerOrderRecord {
        id: id.to_string(),
        client_order_id: Some(client_order_id.to_string()),
        symbol: Some("AAPL".to_string()),
        side: Some("buy".to_string()),
        qty: Some(dec!(100)),
        status: status.to_string(),
        filled_qty,
        filled_avg_price,
        limit_price: None,
        notional: None,
        created_at: Some(now),
        updated_at: Some(now),
    }
}

fn service(broker: Arc<MemoryBroker>, store: Arc<MemoryStore>, cache: Arc<MemoryCache>) -> ReconciliationService {
    ReconciliationService::new(
        broker,
        store,
        cache,
        ReconciliationConfig::default(),
        Arc::new(ReconciliationState::new()),
        "pod-test".to_string(),
    )
}

/// Scenario 1: a broker order that turned `filled` is picked up on a
/// cycle with a prior high-water mark (the recent-activity window), is
/// applied via CAS, and gets a synthetic fill covering the gap.
#[tokio::test]
async fn happy_path_sync_applies_cas_and_backfills_fill() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());

    store.insert_order(local_order("co-1", OrderStatus::New));
    store.set_high_water_mark("reconciliation", Utc::now() - Duration::minutes(5)).await.unwrap();
    broker.add_order(broker_order("b-1", "co-1", "filled", Some(dec!(100)), Some(dec!(150.50))));

    let svc = service(Arc::clone(&broker), Arc::clone(&store), cache);
    let report = svc.run_reconciliation_once("test").await.unwrap();

    assert_eq!(report.applied_updates, 1);
    assert_eq!(report.conflicts_skipped, 0);

    let updated = store.get_order(&ClientOrderId::new("co-1")).unwrap();
    assert_eq!(updated.status, OrderStatus::Filled);
    assert_eq!(updated.fills.len(), 1);
    assert!(updated.fills[0].synthetic);
    assert_eq!(updated.fills[0].fill_qty, dec!(100));
}

/// Scenario 2: a dominant local writer (manual) already holds the order,
/// so the reconciliation CAS write is rejected, but the cycle still
/// succeeds and no fill is written.
#[tokio::test]
async fn cas_conflict_does_not_fail_the_cycle() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());

    let mut order = local_order("co-2", OrderStatus::New);
    order.source_priority = SourcePriority::Manual;
    store.insert_order(order);
    store.set_high_water_mark("reconciliation", Utc::now() - Duration::minutes(5)).await.unwrap();
    broker.add_order(broker_order("b-2", "co-2", "filled", Some(dec!(100)), Some(dec!(150.50))));

    let svc = service(Arc::clone(&broker), Arc::clone(&store), cache);
    let report = svc.run_reconciliation_once("test").await.unwrap();

    assert_eq!(report.applied_updates, 0);
    assert_eq!(report.conflicts_skipped, 1);

    let unchanged = store.get_order(&ClientOrderId::new("co-2")).unwrap();
    assert_eq!(unchanged.status, OrderStatus::New);
    assert!(unchanged.fills.is_empty());
}

/// Scenario 3: a broker order with no local record is an orphan: it gets
/// persisted, its terminal status resolves it, and both the wildcard
/// quarantine key and the exposure key are written to the cache.
#[tokio::test]
async fn orphan_terminal_order_is_quarantined() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());

    store.set_high_water_mark("reconciliation", Utc::now() - Duration::minutes(5)).await.unwrap();
    broker.add_order(broker_order("b1", "co-unknown", "filled", Some(dec!(50)), Some(dec!(20))));

    let svc = service(Arc::clone(&broker), Arc::clone(&store), Arc::clone(&cache));
    let report = svc.run_reconciliation_once("test").await.unwrap();

    assert_eq!(report.orphans_handled, 1);

    let orphan = store.get_orphan(&BrokerOrderId::new("b1")).unwrap();
    assert_eq!(orphan.symbol, Symbol::new("AAPL"));
    assert!(orphan.resolved_at.is_some());

    assert_eq!(cache.get("quarantine:*:AAPL").as_deref(), Some("orphan_order_detected"));
    assert!(cache.get("orphan_exposure:external:AAPL").is_some());
}

/// Scenario 4: a gap between the broker's reported fill quantity and
/// what's locally recorded is covered by exactly one synthetic fill.
#[tokio::test]
async fn fill_gap_is_covered_by_one_synthetic_fill() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());

    let mut order = local_order("co-3", OrderStatus::PartiallyFilled);
    order.fills.push(reconciliation_core::FillRecord {
        fill_id: "real-1".to_string(),
        fill_qty: dec!(30),
        fill_price: dec!(150),
        realized_pl: rust_decimal::Decimal::ZERO,
        timestamp: Utc::now(),
        synthetic: false,
        source: reconciliation_core::FillSource::AlpacaActivity,
        superseded: false,
    });
    store.insert_order(order);
    store.set_high_water_mark("reconciliation", Utc::now() - Duration::minutes(5)).await.unwrap();
    broker.add_order(broker_order("b-3", "co-3", "filled", Some(dec!(100)), Some(dec!(150.50))));

    let svc = service(Arc::clone(&broker), Arc::clone(&store), cache);
    svc.run_reconciliation_once("test").await.unwrap();

    let updated = store.get_order(&ClientOrderId::new("co-3")).unwrap();
    let synthetic: Vec<_> = updated.fills.iter().filter(|f| f.synthetic).collect();
    assert_eq!(synthetic.len(), 1);
    assert_eq!(synthetic[0].fill_qty, dec!(70));
    assert_eq!(synthetic[0].fill_price, dec!(150.50));
    assert_eq!(synthetic[0].source, reconciliation_core::FillSource::ReconciliationBackfill);
}

/// Scenario 5: broker activity pagination across a page boundary that
/// re-serves one overlapping activity is deduplicated.
#[tokio::test]
async fn pagination_dedups_overlapping_activity() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let now = Utc::now();

    let mut order = local_order("co-4", OrderStatus::New);
    order.broker_order_id = Some(BrokerOrderId::new("b-4"));
    store.insert_order(order);

    for i in 0..102 {
        broker.add_activity(ActivityRecord {
            id: format!("fill-{i}"),
            order_id: Some("b-4".to_string()),
            symbol: Some("AAPL".to_string()),
            side: Some("buy".to_string()),
            qty: Some(dec!(1)),
            price: Some(dec!(100)),
            transaction_time: Some(now - Duration::seconds(i64::from(i))),
            activity_time: None,
        });
    }

    let mut config = ReconciliationConfig::default();
    config.fills_backfill_enabled = true;
    config.fills_backfill_page_size = 100;

    let svc = ReconciliationService::new(
        Arc::clone(&broker),
        Arc::clone(&store),
        cache,
        config,
        Arc::new(ReconciliationState::new()),
        "pod-test".to_string(),
    );
    let report = svc.run_reconciliation_once("test").await.unwrap();

    let backfill = report.alpaca_backfill.expect("alpaca backfill should have run");
    assert_eq!(backfill.fills_seen, 102);
}

/// Scenario 6: a forced startup bypass succeeds once a prior cycle result
/// exists, and fails before any cycle has ever run.
#[tokio::test]
async fn forced_bypass_requires_prior_cycle_result() {
    let state = ReconciliationState::new();

    let err = state
        .mark_startup_complete(true, "op", "broker down", Utc::now())
        .unwrap_err();
    assert!(matches!(err, InvalidBypassError::NoPriorResult));

    state.record_reconciliation_result(ReconciliationResult {
        status: CycleStatus::Failed,
        error: Some("broker connection error: unreachable".to_string()),
        mode: "startup".to_string(),
        timestamp: Utc::now(),
    });

    state.mark_startup_complete(true, "op", "broker down", Utc::now()).unwrap();
    assert!(state.is_startup_complete());
    let ctx = state.override_context().unwrap();
    assert_eq!(ctx.user_id, "op");
    assert_eq!(ctx.last_result.status, CycleStatus::Failed);
}

/// DryRun skips all writes for a periodic cycle, not just for startup:
/// a broker order that would otherwise be applied via CAS is left
/// untouched and the high-water mark never advances, but the cycle
/// still reports success and opens the startup gate.
#[tokio::test]
async fn dry_run_skips_writes_on_periodic_cycle() {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());

    store.insert_order(local_order("co-5", OrderStatus::New));
    broker.add_order(broker_order("b-5", "co-5", "filled", Some(dec!(100)), Some(dec!(150.50))));

    let mut config = ReconciliationConfig::default();
    config.dry_run = true;
    let state = Arc::new(ReconciliationState::new());
    let svc = ReconciliationService::new(
        Arc::clone(&broker),
        Arc::clone(&store),
        cache,
        config,
        Arc::clone(&state),
        "pod-test".to_string(),
    );

    let report = svc.run_reconciliation_once("periodic").await.unwrap();

    assert_eq!(report.applied_updates, 0);
    assert_eq!(report.conflicts_skipped, 0);
    assert!(state.is_startup_complete());

    let unchanged = store.get_order(&ClientOrderId::new("co-5")).unwrap();
    assert_eq!(unchanged.status, OrderStatus::New);
    assert!(unchanged.fills.is_empty());
    assert!(store.get_high_water_mark("reconciliation").await.unwrap().is_none());
}
