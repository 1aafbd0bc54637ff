//! In-memory cache with per-entry expiration.
//!
//! The store is the only mutable structure shared between resolutions. It is
//! TTL-bounded only (no LRU or size cap) and lives for the process lifetime.

mod store;

pub use store::{CacheEntry, CacheStore};
