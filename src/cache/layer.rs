//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::CacheStore;
use super::traits::{CacheResult, QueryKey};

/// Cache layer that manages caching logic and network fetching.
///
/// Payloads are stored as JSON values so one store can hold responses of
/// every shape. Only successful fetches are written; a failed fetch never
/// caches anything.
#[derive(Clone)]
pub struct CacheLayer {
  store: Arc<CacheStore>,
}

impl CacheLayer {
  pub fn new(store: Arc<CacheStore>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &CacheStore {
    &self.store
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if valid, return immediately
  /// 2. If expired/missing, fetch from network
  /// 3. On success, replace the cache entry
  /// 4. On network failure, return the expired entry if one exists (offline mode)
  pub async fn fetch<K, T, F, Fut, E>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>, E>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let hash = key.cache_hash();

    if self.store.is_valid(&hash) {
      if let Some((data, cached_at)) = self.read(&hash) {
        debug!(query = %key.description(), "cache hit");
        return Ok(CacheResult::from_cache(data, cached_at));
      }
    }

    match fetcher().await {
      Ok(data) => {
        self.write(&hash, &data);
        Ok(CacheResult::from_network(data))
      }
      Err(err) => match self.read(&hash) {
        Some((stale, cached_at)) => {
          warn!(query = %key.description(), "network failed, serving expired cache entry");
          Ok(CacheResult::offline(stale, cached_at))
        }
        None => Err(err),
      },
    }
  }

  /// Fetch from the network unconditionally and replace the cache entry on
  /// success. Falls back to an existing entry like [`CacheLayer::fetch`].
  pub async fn refresh<K, T, F, Fut, E>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>, E>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let hash = key.cache_hash();

    match fetcher().await {
      Ok(data) => {
        self.write(&hash, &data);
        Ok(CacheResult::from_network(data))
      }
      Err(err) => match self.read(&hash) {
        Some((stale, cached_at)) => {
          warn!(query = %key.description(), "refresh failed, serving cached entry");
          Ok(CacheResult::offline(stale, cached_at))
        }
        None => Err(err),
      },
    }
  }

  fn read<T: DeserializeOwned>(&self, hash: &str) -> Option<(T, tokio::time::Instant)> {
    let entry = self.store.entry(hash)?;
    match serde_json::from_value(entry.payload) {
      Ok(data) => Some((data, entry.captured_at)),
      Err(e) => {
        debug!(key = hash, error = %e, "discarding undecodable cache entry");
        None
      }
    }
  }

  fn write<T: Serialize>(&self, hash: &str, data: &T) {
    match serde_json::to_value(data) {
      Ok(payload) => self.store.set(hash, payload),
      Err(e) => warn!(key = hash, error = %e, "failed to serialize response for cache"),
    }
  }
}
