//! In-memory `Cache` test double.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{Cache, CacheError};

/// In-memory reference implementation of `Cache`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create a new, empty cache double.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value back out (test assertions).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(key).cloned()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = MemoryCache::new();
        cache.set("quarantine:*:AAPL", "orphan_order_detected").await.unwrap();
        assert_eq!(cache.get("quarantine:*:AAPL").as_deref(), Some("orphan_order_detected"));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert!(cache.get("nope").is_none());
    }
}
