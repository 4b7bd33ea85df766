//! The quarantine/exposure cache this core consumes.
//!
//! Writes here are fire-and-forget at the call site: a cache outage must
//! never fail a reconciliation cycle, because the order-submission path
//! (outside this core) performs its own independent quarantine check and
//! stays fail-closed even if a write here is lost.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a `Cache` implementation.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not be reached or rejected the write.
    #[error("cache error: {0}")]
    Operation(String),
}

/// The cache surface consumed by reconciliation.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Set `key` to `value`.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Bit-exact quarantine key for `(strategy_id, symbol)`.
#[must_use]
pub fn quarantine_key(strategy_id: &str, symbol: &str) -> String {
    format!("quarantine:{strategy_id}:{symbol}")
}

/// Sentinel value stamped into a quarantine key on detection.
pub const QUARANTINE_VALUE: &str = "orphan_order_detected";

/// Bit-exact orphan-exposure key for `(strategy_id, symbol)`.
#[must_use]
pub fn orphan_exposure_key(strategy_id: &str, symbol: &str) -> String {
    format!("orphan_exposure:{strategy_id}:{symbol}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantine_key_schema() {
        assert_eq!(quarantine_key("*", "AAPL"), "quarantine:*:AAPL");
    }

    #[test]
    fn orphan_exposure_key_schema() {
        assert_eq!(
            orphan_exposure_key("external", "TSLA"),
            "orphan_exposure:external:TSLA"
        );
    }
}
