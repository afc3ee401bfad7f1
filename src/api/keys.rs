//! Cache keys for catalog requests.

use crate::cache::{hash_key, QueryKey, QueryParams};

use super::types::ProductQuery;

/// Query key types for cached catalog calls.
#[derive(Clone, Debug)]
pub enum CatalogQueryKey {
  /// Product listing with its full parameter set
  Products { params: QueryParams },
  /// A single product by id
  ProductDetail { id: u64 },
  /// The category list
  Categories,
}

impl CatalogQueryKey {
  pub fn products(query: &ProductQuery) -> Self {
    Self::Products {
      params: query.params(),
    }
  }

  fn input(&self) -> String {
    match self {
      Self::Products { params } => format!("products:{}", params.canonical()),
      Self::ProductDetail { id } => format!("product_{}", id),
      Self::Categories => "categories".to_string(),
    }
  }
}

impl QueryKey for CatalogQueryKey {
  fn cache_hash(&self) -> String {
    hash_key(&self.input())
  }

  fn description(&self) -> String {
    match self {
      Self::Products { params } if params.is_empty() => "all products".to_string(),
      Self::Products { params } => format!("products: {}", params.canonical()),
      Self::ProductDetail { id } => format!("product {}", id),
      Self::Categories => "categories".to_string(),
    }
  }
}
