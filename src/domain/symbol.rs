//! Trading symbol value object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading symbol.
///
/// Comparisons are case-sensitive: the broker and the store are the
/// source of truth for casing, and this core never normalizes a symbol
/// it did not originate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new symbol, preserving the caller's casing.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_preserves_case() {
        let s = Symbol::new("AAPL");
        assert_eq!(s.as_str(), "AAPL");
        let s = Symbol::new("aapl");
        assert_eq!(s.as_str(), "aapl");
    }

    #[test]
    fn symbol_case_sensitive_equality() {
        assert_ne!(Symbol::new("AAPL"), Symbol::new("aapl"));
    }
}
