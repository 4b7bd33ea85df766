//! Reconciliation tuning knobs (§6.5).

use serde::{Deserialize, Serialize};

/// All tunables for the reconciliation cycle and its periodic loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Sleep between periodic cycles.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Startup bound used by `startup_timed_out`.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Cap on individual `get_order_by_client_id` calls per cycle.
    #[serde(default = "default_max_individual_lookups")]
    pub max_individual_lookups: usize,
    /// HWM rewind applied to the window start, to tolerate clock skew
    /// and late-arriving broker writes.
    #[serde(default = "default_overlap_seconds")]
    pub overlap_seconds: i64,
    /// Grace window before an order stuck in `submitted_unconfirmed` is
    /// escalated to `failed`.
    #[serde(default = "default_submitted_unconfirmed_grace_seconds")]
    pub submitted_unconfirmed_grace_seconds: i64,
    /// Gate for broker activity fill backfill (§4.5.4).
    #[serde(default = "default_fills_backfill_enabled")]
    pub fills_backfill_enabled: bool,
    /// Lookback window used when no high-water mark is on file.
    #[serde(default = "default_fills_backfill_initial_lookback_hours")]
    pub fills_backfill_initial_lookback_hours: i64,
    /// Broker API page size for activity pagination.
    #[serde(default = "default_fills_backfill_page_size")]
    pub fills_backfill_page_size: u32,
    /// Pagination cap per cycle.
    #[serde(default = "default_fills_backfill_max_pages")]
    pub fills_backfill_max_pages: u32,
    /// Skip all writes; startup gate is always considered open.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            timeout_seconds: default_timeout_seconds(),
            max_individual_lookups: default_max_individual_lookups(),
            overlap_seconds: default_overlap_seconds(),
            submitted_unconfirmed_grace_seconds: default_submitted_unconfirmed_grace_seconds(),
            fills_backfill_enabled: default_fills_backfill_enabled(),
            fills_backfill_initial_lookback_hours: default_fills_backfill_initial_lookback_hours(),
            fills_backfill_page_size: default_fills_backfill_page_size(),
            fills_backfill_max_pages: default_fills_backfill_max_pages(),
            dry_run: default_dry_run(),
        }
    }
}

const fn default_poll_interval_seconds() -> u64 {
    300
}

const fn default_timeout_seconds() -> f64 {
    300.0
}

const fn default_max_individual_lookups() -> usize {
    100
}

const fn default_overlap_seconds() -> i64 {
    60
}

const fn default_submitted_unconfirmed_grace_seconds() -> i64 {
    300
}

const fn default_fills_backfill_enabled() -> bool {
    false
}

const fn default_fills_backfill_initial_lookback_hours() -> i64 {
    24
}

const fn default_fills_backfill_page_size() -> u32 {
    100
}

const fn default_fills_backfill_max_pages() -> u32 {
    5
}

const fn default_dry_run() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ReconciliationConfig::default();
        assert_eq!(config.poll_interval_seconds, 300);
        assert_eq!(config.timeout_seconds, 300.0);
        assert_eq!(config.max_individual_lookups, 100);
        assert_eq!(config.overlap_seconds, 60);
        assert_eq!(config.submitted_unconfirmed_grace_seconds, 300);
        assert!(!config.fills_backfill_enabled);
        assert_eq!(config.fills_backfill_initial_lookback_hours, 24);
        assert_eq!(config.fills_backfill_page_size, 100);
        assert_eq!(config.fills_backfill_max_pages, 5);
        assert!(!config.dry_run);
    }
}
