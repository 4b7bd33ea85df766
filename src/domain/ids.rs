//! Strongly-typed identifiers for reconciliation entities.
//!
//! These prevent mixing up a locally-assigned `ClientOrderId` with the
//! broker's own `BrokerOrderId`, which is exactly the class of bug CAS
//! source-priority resolution exists to survive.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Returns true if the identifier is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    ClientOrderId,
    "Locally-assigned identifier an order is created under."
);
define_id!(
    BrokerOrderId,
    "Broker-assigned identifier, present once the broker acknowledges an order."
);
define_id!(FillId, "Identifier of a single fill, unique within an order.");

/// Source priority attached to every state-transition attempt.
///
/// Lower wins on conflict: `Manual` (1) outranks `Reconciliation` (2),
/// which outranks `Webhook` (3). The store's CAS only applies a
/// reconciliation write when the currently stored priority is at least
/// as permissive as `Reconciliation` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SourcePriority {
    /// Manual operator intervention. Highest authority.
    Manual = 1,
    /// This reconciliation core.
    Reconciliation = 2,
    /// Broker webhook / push notification.
    Webhook = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_id_roundtrip() {
        let id = ClientOrderId::new("co-123");
        assert_eq!(id.as_str(), "co-123");
        assert_eq!(format!("{id}"), "co-123");
    }

    #[test]
    fn client_order_id_empty() {
        assert!(ClientOrderId::new("").is_empty());
        assert!(!ClientOrderId::new("x").is_empty());
    }

    #[test]
    fn source_priority_ordering() {
        assert!(SourcePriority::Manual < SourcePriority::Reconciliation);
        assert!(SourcePriority::Reconciliation < SourcePriority::Webhook);
    }

    #[test]
    fn ids_hash_for_maps() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ClientOrderId::new("a"));
        set.insert(ClientOrderId::new("a"));
        set.insert(ClientOrderId::new("b"));
        assert_eq!(set.len(), 2);
    }
}
