//! Fail-soft data fetching with caching and timeouts.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, CacheResult, CacheStore};

use super::error::FetchError;
use super::keys::CatalogQueryKey;
use super::transport::{ApiRequest, ApiResponse, Transport};
use super::types::{
  AnalyticsQuery, AnalyticsReport, DateRange, EventContext, ExportFormat, MetricsSnapshot, Page,
  Product, ProductQuery, TrackedEvent,
};

/// Timeout applied to requests that don't set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const PRODUCTS_PATH: &str = "/api/v1/products";
const CATEGORIES_PATH: &str = "/api/v1/products/categories";
const ANALYTICS_PATH: &str = "/api/v1/analytics";
const REALTIME_PATH: &str = "/api/v1/analytics/realtime";
const EVENTS_PATH: &str = "/api/v1/analytics/events";
const EXPORT_PATH: &str = "/api/v1/analytics/export";

/// Performs API requests and never surfaces their failures.
///
/// Every typed operation resolves to a usable value: on transport failure,
/// timeout, non-2xx status or an undecodable body the failure is logged and
/// the type's `Default` is returned instead. Successful listing responses are
/// cached; failures bypass the cache entirely.
#[derive(Clone)]
pub struct DataFetcher {
  transport: Arc<dyn Transport>,
  cache: CacheLayer,
  timeout: Duration,
  context: EventContext,
}

impl DataFetcher {
  pub fn new(transport: Arc<dyn Transport>, store: Arc<CacheStore>) -> Self {
    Self {
      transport,
      cache: CacheLayer::new(store),
      timeout: DEFAULT_TIMEOUT,
      context: EventContext::default(),
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Context attached to every tracked event.
  pub fn with_context(mut self, context: EventContext) -> Self {
    self.context = context;
    self
  }

  pub fn cache(&self) -> &CacheStore {
    self.cache.store()
  }

  /// Send a request, enforcing the timeout and a 2xx status.
  async fn send(&self, request: ApiRequest) -> Result<ApiResponse, FetchError> {
    let timeout = request.timeout.unwrap_or(self.timeout);
    let response = time::timeout(timeout, self.transport.send(request))
      .await
      .map_err(|_| FetchError::Timeout(timeout))??;

    if !response.is_success() {
      return Err(FetchError::Status(response.status));
    }
    Ok(response)
  }

  /// Fetch and decode, reporting failures to the caller.
  pub async fn try_fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, FetchError> {
    self.send(request).await?.json()
  }

  /// Fetch and decode, substituting `T::default()` on any failure.
  pub async fn fetch<T: DeserializeOwned + Default>(&self, request: ApiRequest) -> T {
    let path = request.path.clone();
    match self.try_fetch(request).await {
      Ok(data) => data,
      Err(e) => {
        warn!(%path, error = %e, "fetch failed, using fallback");
        T::default()
      }
    }
  }

  /// Cache-first fetch, substituting `T::default()` when both the network
  /// and the cache come up empty.
  pub async fn fetch_cached<T>(&self, key: &CatalogQueryKey, request: ApiRequest) -> CacheResult<T>
  where
    T: Serialize + DeserializeOwned + Default,
  {
    let path = request.path.clone();
    match self.cache.fetch(key, || self.try_fetch(request)).await {
      Ok(result) => result,
      Err(e) => {
        warn!(%path, error = %e, "fetch failed, using fallback");
        CacheResult::fallback(T::default())
      }
    }
  }

  // ==========================================================================
  // Catalog
  // ==========================================================================

  /// Product listing through the cache.
  pub async fn products(&self, query: &ProductQuery) -> CacheResult<Page<Product>> {
    let key = CatalogQueryKey::products(query);
    let request = ApiRequest::get(PRODUCTS_PATH).with_params(query.params());
    self.fetch_cached(&key, request).await
  }

  /// Product listing straight from the network; a success replaces the
  /// cached entry for the same query.
  pub async fn refresh_products(&self, query: &ProductQuery) -> CacheResult<Page<Product>> {
    let key = CatalogQueryKey::products(query);
    let request = ApiRequest::get(PRODUCTS_PATH).with_params(query.params());
    match self.cache.refresh(&key, || self.try_fetch(request)).await {
      Ok(result) => result,
      Err(e) => {
        warn!(path = PRODUCTS_PATH, error = %e, "refresh failed, using fallback");
        CacheResult::fallback(Page::default())
      }
    }
  }

  /// A single product, `None` if it can't be fetched.
  pub async fn product(&self, id: u64) -> Option<Product> {
    let key = CatalogQueryKey::ProductDetail { id };
    let request = ApiRequest::get(format!("{}/{}", PRODUCTS_PATH, id));
    self.fetch_cached::<Option<Product>>(&key, request).await.data
  }

  pub async fn categories(&self) -> Vec<String> {
    let request = ApiRequest::get(CATEGORIES_PATH);
    self
      .fetch_cached(&CatalogQueryKey::Categories, request)
      .await
      .data
  }

  // ==========================================================================
  // Analytics
  // ==========================================================================

  pub async fn analytics(&self, query: &AnalyticsQuery) -> AnalyticsReport {
    self
      .fetch(ApiRequest::get(ANALYTICS_PATH).with_params(query.params()))
      .await
  }

  /// Current live metrics, zeroed on failure.
  pub async fn realtime_metrics(&self) -> MetricsSnapshot {
    self.fetch(ApiRequest::get(REALTIME_PATH)).await
  }

  /// Post a tracking event in the background.
  ///
  /// The returned handle may be dropped; failures are only logged.
  pub fn track_event(&self, name: &str, data: Value) -> JoinHandle<()> {
    let event = TrackedEvent {
      event: name.to_string(),
      data,
      timestamp: Utc::now(),
      context: self.context.clone(),
    };
    let fetcher = self.clone();

    tokio::spawn(async move {
      let body = match serde_json::to_value(&event) {
        Ok(body) => body,
        Err(e) => {
          warn!(event = %event.event, error = %e, "failed to encode tracking event");
          return;
        }
      };
      match fetcher.send(ApiRequest::post(EVENTS_PATH, body)).await {
        Ok(_) => debug!(event = %event.event, "event tracked"),
        Err(e) => warn!(event = %event.event, error = %e, "failed to track event"),
      }
    })
  }

  /// Exported analytics file contents, empty on failure.
  pub async fn export(&self, format: ExportFormat, range: &DateRange) -> Vec<u8> {
    let mut params = crate::cache::QueryParams::new();
    params
      .insert("format", format.as_str())
      .insert("startDate", range.start.to_rfc3339())
      .insert("endDate", range.end.to_rfc3339());

    match self
      .send(ApiRequest::get(EXPORT_PATH).with_params(params))
      .await
    {
      Ok(response) => response.body,
      Err(e) => {
        warn!(path = EXPORT_PATH, error = %e, "export failed");
        Vec::new()
      }
    }
  }
}
