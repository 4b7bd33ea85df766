//! In-memory reference adapters for the `BrokerClient`, `Store`, and
//! `Cache` ports. Used by the demo binary and by integration tests; a
//! production deployment supplies its own adapters over these same
//! traits.

mod memory_broker;
mod memory_cache;
mod memory_store;

pub use memory_broker::MemoryBroker;
pub use memory_cache::MemoryCache;
pub use memory_store::MemoryStore;
