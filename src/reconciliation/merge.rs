//! Merge broker order snapshots from the open-orders and recent-activity
//! sweeps into a single per-`ClientOrderId` view (§4.3a).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ports::BrokerOrderRecord;

fn effective_timestamp(record: &BrokerOrderRecord) -> Option<DateTime<Utc>> {
    record.updated_at.or(record.created_at)
}

/// Merge two broker order sweeps into a map keyed by `client_order_id`.
///
/// Orders with an empty or missing `client_order_id` are skipped — they
/// can never be matched against a local record and are handled purely by
/// orphan detection. When a `client_order_id` appears in both sweeps, the
/// record with the newer `updated_at ?? created_at` wins; a record with
/// any timestamp beats one with none, and an exact tie keeps whichever
/// record was seen first.
#[must_use]
pub fn merge(open: &[BrokerOrderRecord], recent: &[BrokerOrderRecord]) -> HashMap<String, BrokerOrderRecord> {
    let mut merged: HashMap<String, BrokerOrderRecord> = HashMap::new();
    for record in open.iter().chain(recent.iter()) {
        let Some(client_order_id) = record.client_order_id.as_ref().filter(|id| !id.is_empty()) else {
            continue;
        };
        match merged.get(client_order_id) {
            None => {
                merged.insert(client_order_id.clone(), record.clone());
            }
            Some(existing) => {
                if should_replace(existing, record) {
                    merged.insert(client_order_id.clone(), record.clone());
                }
            }
        }
    }
    merged
}

fn should_replace(existing: &BrokerOrderRecord, incoming: &BrokerOrderRecord) -> bool {
    match (effective_timestamp(existing), effective_timestamp(incoming)) {
        (None, Some(_)) => true,
        (Some(_), None) | (None, None) => false,
        (Some(existing_ts), Some(incoming_ts)) => incoming_ts > existing_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(client_order_id: &str, updated_at: Option<DateTime<Utc>>) -> BrokerOrderRecord {
        BrokerOrderRecord {
            id: format!("b-{client_order_id}"),
            client_order_id: Some(client_order_id.to_string()),
            symbol: Some("AAPL".to_string()),
            side: Some("buy".to_string()),
            qty: None,
            status: "new".to_string(),
            filled_qty: None,
            filled_avg_price: None,
            limit_price: None,
            notional: None,
            created_at: None,
            updated_at,
        }
    }

    #[test]
    fn skips_empty_client_order_id() {
        let mut rec = record("co-1", None);
        rec.client_order_id = Some(String::new());
        let merged = merge(&[rec], &[]);
        assert!(merged.is_empty());
    }

    #[test]
    fn newer_timestamp_wins() {
        let now = Utc::now();
        let older = record("co-1", Some(now - Duration::seconds(10)));
        let newer = record("co-1", Some(now));
        let merged = merge(&[older], &[newer.clone()]);
        assert_eq!(merged.get("co-1").unwrap().status, newer.status);
    }

    #[test]
    fn timestamped_beats_untimestamped() {
        let now = Utc::now();
        let undated = record("co-1", None);
        let dated = record("co-1", Some(now));
        let merged = merge(&[undated], &[dated]);
        assert_eq!(merged.get("co-1").unwrap().updated_at, Some(now));

        let merged = merge(&[dated], &[undated]);
        assert_eq!(merged.get("co-1").unwrap().updated_at, Some(now));
    }

    #[test]
    fn exact_tie_keeps_first_seen() {
        let now = Utc::now();
        let mut first = record("co-1", Some(now));
        first.id = "first".to_string();
        let mut second = record("co-1", Some(now));
        second.id = "second".to_string();
        let merged = merge(&[first.clone()], &[second]);
        assert_eq!(merged.get("co-1").unwrap().id, first.id);
    }
}
