//! In-memory response cache with TTL validity.
//!
//! This module is independent of the catalog API:
//! - Stores opaque JSON payloads under deterministic query keys
//! - Reports validity separately from lookup so callers may accept stale data
//! - Serves expired entries as an offline fallback when the network fails

mod key;
mod layer;
mod store;
mod traits;

pub use key::{hash_key, QueryParams};
pub use layer::CacheLayer;
pub use store::{CacheEntry, CacheStore, DEFAULT_TTL};
pub use traits::{CacheResult, CacheSource, QueryKey};
