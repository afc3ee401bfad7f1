//! Canonical query parameters and key hashing.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Display;
use url::form_urlencoded;

/// Query string parameters kept in sorted order.
///
/// Two parameter sets with the same pairs compare equal and render the same
/// canonical string regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: &str, value: impl Display) -> &mut Self {
    self.0.insert(key.to_string(), value.to_string());
    self
  }

  /// Insert only when `value` is present.
  pub fn insert_opt(&mut self, key: &str, value: Option<impl Display>) -> &mut Self {
    if let Some(value) = value {
      self.insert(key, value);
    }
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn pairs(&self) -> Vec<(&str, &str)> {
    self
      .0
      .iter()
      .map(|(k, v)| (k.as_str(), v.as_str()))
      .collect()
  }

  /// `k1=v1&k2=v2` in key order, form-urlencoded so that separators inside
  /// keys or values cannot alias another parameter set.
  pub fn canonical(&self) -> String {
    form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.0.iter())
      .finish()
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(
      iter
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}

/// SHA256 hex digest for stable, fixed-length keys.
pub fn hash_key(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parameter_order_does_not_matter() {
    let a: QueryParams = [("page", "0"), ("size", "100"), ("search", "lamp")]
      .into_iter()
      .collect();
    let mut b = QueryParams::new();
    b.insert("search", "lamp").insert("size", 100).insert("page", 0);

    assert_eq!(a, b);
    assert_eq!(a.canonical(), b.canonical());
    assert_eq!(hash_key(&a.canonical()), hash_key(&b.canonical()));
  }

  #[test]
  fn test_different_values_produce_different_keys() {
    let mut a = QueryParams::new();
    a.insert("page", 0);
    let mut b = QueryParams::new();
    b.insert("page", 1);

    assert_ne!(hash_key(&a.canonical()), hash_key(&b.canonical()));
  }

  #[test]
  fn test_insert_opt_skips_none() {
    let mut params = QueryParams::new();
    params
      .insert_opt("search", None::<&str>)
      .insert_opt("minPrice", Some(5));
    assert_eq!(params.canonical(), "minPrice=5");
    assert_eq!(params.get("search"), None);
  }

  #[test]
  fn test_separators_in_values_do_not_alias() {
    let a: QueryParams = [("search", "a&size=1"), ("size", "3")].into_iter().collect();
    let b: QueryParams = [("search", "a"), ("size", "1&size=3")].into_iter().collect();

    assert_ne!(a, b);
    assert_ne!(a.canonical(), b.canonical());
    assert_eq!(a.canonical(), "search=a%26size%3D1&size=3");
  }
}
