//! Position snapshot value object.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

/// A broker-authoritative position snapshot for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Signed quantity held.
    pub qty: Decimal,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Current mark price, if the broker supplied one. Opaque passthrough.
    pub current_price: Option<Decimal>,
    /// When this snapshot was last written.
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Build a flattened (zero-quantity) snapshot for a symbol no longer
    /// held at the broker, stamped at `now`.
    #[must_use]
    pub fn flattened(symbol: Symbol, avg_entry_price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            qty: Decimal::ZERO,
            avg_entry_price,
            current_price: None,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn flattened_has_zero_qty() {
        let now = Utc::now();
        let pos = Position::flattened(Symbol::new("AAPL"), dec!(150.25), now);
        assert_eq!(pos.qty, Decimal::ZERO);
        assert_eq!(pos.avg_entry_price, dec!(150.25));
        assert_eq!(pos.updated_at, now);
    }
}
