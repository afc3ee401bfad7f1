//! Time-stamped key/value store.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::lock;

/// Default time-to-live for catalog queries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached payload and when it was captured.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: String,
  pub payload: Value,
  pub captured_at: Instant,
}

/// Key/value store whose entries are valid for a fixed TTL.
///
/// Entries are never evicted on their own: an expired entry stays readable
/// through [`CacheStore::get`] until it is overwritten or the store is
/// cleared. Freshness is reported separately by [`CacheStore::is_valid`].
#[derive(Debug)]
pub struct CacheStore {
  entries: Mutex<HashMap<String, CacheEntry>>,
  ttl: Duration,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore {
  pub fn new() -> Self {
    Self::with_ttl(DEFAULT_TTL)
  }

  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl,
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// Payload stored under `key`, fresh or not.
  pub fn get(&self, key: &str) -> Option<Value> {
    lock(&self.entries).get(key).map(|entry| entry.payload.clone())
  }

  /// Full entry stored under `key`, fresh or not.
  pub fn entry(&self, key: &str) -> Option<CacheEntry> {
    lock(&self.entries).get(key).cloned()
  }

  /// Store `payload`, replacing any previous entry for `key`.
  pub fn set(&self, key: impl Into<String>, payload: Value) {
    let key = key.into();
    let entry = CacheEntry {
      key: key.clone(),
      payload,
      captured_at: Instant::now(),
    };
    lock(&self.entries).insert(key, entry);
  }

  /// True iff an entry exists and is younger than the TTL.
  pub fn is_valid(&self, key: &str) -> bool {
    lock(&self.entries)
      .get(key)
      .map(|entry| entry.captured_at.elapsed() < self.ttl)
      .unwrap_or(false)
  }

  pub fn captured_at(&self, key: &str) -> Option<Instant> {
    lock(&self.entries).get(key).map(|entry| entry.captured_at)
  }

  pub fn clear(&self) {
    lock(&self.entries).clear();
  }

  pub fn len(&self) -> usize {
    lock(&self.entries).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
