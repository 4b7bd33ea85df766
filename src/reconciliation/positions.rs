//! Broker-authoritative position reconciliation (§4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Position, Symbol};
use crate::ports::{BrokerClient, Store};
use crate::reconciliation::error::ReconciliationError;

/// Counts produced by a single `reconcile_positions` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionReconciliationResult {
    /// Symbols upserted with the broker's reported snapshot.
    pub updated: usize,
    /// Symbols held locally but absent at the broker, flattened to zero.
    pub flattened: usize,
}

/// Reconcile local position snapshots against the broker's authoritative
/// view: upsert everything the broker reports, then flatten (zero out)
/// any symbol held locally but no longer at the broker.
///
/// Symbol comparisons are case-sensitive. If the broker reports the same
/// symbol twice, the last occurrence wins.
pub async fn reconcile_positions(
    broker: &dyn BrokerClient,
    store: &dyn Store,
    now: DateTime<Utc>,
) -> Result<PositionReconciliationResult, ReconciliationError> {
    let broker_positions = broker.get_all_positions().await?;
    let mut by_symbol: HashMap<Symbol, Position> = HashMap::new();
    for record in broker_positions {
        let symbol = Symbol::new(record.symbol);
        by_symbol.insert(
            symbol.clone(),
            Position {
                symbol,
                qty: record.qty,
                avg_entry_price: record.avg_entry_price,
                current_price: record.current_price,
                updated_at: now,
            },
        );
    }

    let db_positions = store.get_all_positions().await?;

    let mut updated = 0;
    for position in by_symbol.values() {
        store.upsert_position_snapshot(position.clone()).await?;
        updated += 1;
    }

    let mut flattened = 0;
    for db_position in &db_positions {
        if by_symbol.contains_key(&db_position.symbol) {
            continue;
        }
        let flattened_position = Position::flattened(
            db_position.symbol.clone(),
            Decimal::ZERO,
            now,
        );
        store.upsert_position_snapshot(flattened_position).await?;
        tracing::info!(symbol = %db_position.symbol, "Position flattened");
        flattened += 1;
    }

    Ok(PositionReconciliationResult { updated, flattened })
}
