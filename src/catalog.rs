//! Product catalog view model.
//!
//! Ties the fetcher, the filter engine and real-time sync together the way a
//! product listing screen uses them: load a page of products, filter it
//! locally, paginate the visible set and keep it fresh in the background.

use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::types::{Product, ProductQuery, SortOrder};
use crate::api::DataFetcher;
use crate::event::{Event, EventBus, View};
use crate::filter::{FilterCriteria, FilterEngine};
use crate::lock;
use crate::query::RequestTracker;
use crate::sync::RealTimeSync;

const ALL_CATEGORIES: &str = "All Categories";
const MAX_RELATED: usize = 4;
/// Pages shown on each side of the current page
const PAGE_WINDOW: u32 = 2;

/// Paging sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSettings {
  /// Products requested per listing call
  pub page_size: u32,
  /// Products displayed per page
  pub items_per_page: u32,
}

impl Default for CatalogSettings {
  fn default() -> Self {
    Self {
      page_size: 100,
      items_per_page: 12,
    }
  }
}

#[derive(Debug)]
struct CatalogState {
  /// One-based
  current_page: u32,
  sort_by: String,
  sort_order: SortOrder,
  total_items: u64,
  loading: bool,
}

impl Default for CatalogState {
  fn default() -> Self {
    Self {
      current_page: 1,
      sort_by: "name".to_string(),
      sort_order: SortOrder::Asc,
      total_items: 0,
      loading: false,
    }
  }
}

/// Everything a load needs. Holds no reference to the sync that schedules
/// refreshes, so a refresh tick never keeps the catalog alive.
#[derive(Clone)]
struct Listing {
  fetcher: DataFetcher,
  engine: Arc<FilterEngine>,
  bus: EventBus,
  requests: RequestTracker,
  state: Arc<Mutex<CatalogState>>,
  settings: CatalogSettings,
}

impl Listing {
  fn query(&self) -> ProductQuery {
    let criteria = self.engine.criteria();
    let state = lock(&self.state);
    let search = criteria.search_term.trim();

    ProductQuery {
      page: state.current_page.saturating_sub(1),
      size: self.settings.page_size,
      sort_by: state.sort_by.clone(),
      sort_order: state.sort_order,
      search: (!search.is_empty()).then(|| search.to_string()),
      min_price: criteria.price_range.lower_bound(),
      max_price: criteria.price_range.upper_bound(),
      in_stock: criteria.in_stock,
    }
  }

  /// Set the loading flag, announcing transitions.
  fn set_loading(&self, loading: bool) {
    let changed = {
      let mut state = lock(&self.state);
      std::mem::replace(&mut state.loading, loading) != loading
    };
    if changed {
      self.bus.publish(Event::LoadingChanged {
        view: View::Catalog,
        loading,
      });
    }
  }

  async fn load(&self, force: bool) -> bool {
    let ticket = self.requests.begin();
    let query = self.query();
    self.set_loading(true);

    let result = if force {
      self.fetcher.refresh_products(&query).await
    } else {
      self.fetcher.products(&query).await
    };

    if !self.requests.is_current(ticket) {
      debug!(page = query.page, "discarding superseded product listing");
      return false;
    }

    let page = result.data;
    let count = page.content.len();
    let total = if page.total_elements > 0 {
      page.total_elements
    } else {
      count as u64
    };
    lock(&self.state).total_items = total;
    self.set_loading(false);

    debug!(count, total, source = ?result.source, "products loaded");
    self.engine.set_products(page.content);
    self.bus.publish(Event::ProductsLoaded { count, total });
    self.engine.apply_filters();
    true
  }
}

/// The product listing. Clones share all state.
///
/// Dropping the last clone stops its background tasks and releases its
/// subscriptions; [`Catalog::teardown`] does the same eagerly.
#[derive(Clone)]
pub struct Catalog {
  listing: Listing,
  sync: Arc<RealTimeSync>,
}

impl Catalog {
  pub fn new(
    fetcher: DataFetcher,
    engine: Arc<FilterEngine>,
    sync: Arc<RealTimeSync>,
    bus: EventBus,
    settings: CatalogSettings,
  ) -> Self {
    sync.attach_stock_updates(Arc::clone(&engine));
    Self {
      listing: Listing {
        fetcher,
        engine,
        bus,
        requests: RequestTracker::new(),
        state: Arc::new(Mutex::new(CatalogState::default())),
        settings,
      },
      sync,
    }
  }

  pub fn engine(&self) -> &FilterEngine {
    &self.listing.engine
  }

  pub fn sync(&self) -> &RealTimeSync {
    &self.sync
  }

  pub fn current_page(&self) -> u32 {
    lock(&self.listing.state).current_page
  }

  pub fn sort_state(&self) -> (String, SortOrder) {
    let state = lock(&self.listing.state);
    (state.sort_by.clone(), state.sort_order)
  }

  pub fn total_items(&self) -> u64 {
    lock(&self.listing.state).total_items
  }

  pub fn is_loading(&self) -> bool {
    lock(&self.listing.state).loading
  }

  /// Listing request for the current page, sort and criteria.
  ///
  /// Category is filtered locally and never sent.
  pub fn query(&self) -> ProductQuery {
    self.listing.query()
  }

  // ==========================================================================
  // Loading
  // ==========================================================================

  /// Load the current listing through the cache.
  ///
  /// Returns false if a newer load superseded this one, in which case its
  /// result was discarded.
  pub async fn load_products(&self) -> bool {
    self.listing.load(false).await
  }

  /// Load the current listing from the network, replacing the cached entry.
  pub async fn refresh_products(&self) -> bool {
    self.listing.load(true).await
  }

  /// Sort by `field`, toggling the direction if it is already the sort
  /// field, and reload.
  pub async fn sort(&self, field: &str) -> bool {
    {
      let mut state = lock(&self.listing.state);
      if state.sort_by == field {
        state.sort_order = state.sort_order.toggled();
      } else {
        state.sort_by = field.to_string();
        state.sort_order = SortOrder::Asc;
      }
    }
    self.load_products().await
  }

  /// Set the sort without reloading.
  pub fn set_sort(&self, field: &str, order: SortOrder) {
    let mut state = lock(&self.listing.state);
    state.sort_by = field.to_string();
    state.sort_order = order;
  }

  pub async fn set_page(&self, page: u32) -> bool {
    lock(&self.listing.state).current_page = page.max(1);
    self.load_products().await
  }

  // ==========================================================================
  // Pagination
  // ==========================================================================

  pub fn total_pages(&self) -> u32 {
    let total = self.total_items();
    let per_page = u64::from(self.listing.settings.items_per_page.max(1));
    total.div_ceil(per_page) as u32
  }

  /// Page numbers to offer: up to two on each side of the current page.
  pub fn page_numbers(&self) -> Vec<u32> {
    let total_pages = self.total_pages();
    if total_pages == 0 {
      return Vec::new();
    }
    let current = self.current_page().min(total_pages);
    let start = current.saturating_sub(PAGE_WINDOW).max(1);
    let end = (current + PAGE_WINDOW).min(total_pages);
    (start..=end).collect()
  }

  // ==========================================================================
  // Filters
  // ==========================================================================

  /// Number of held products in `category`.
  pub fn category_count(&self, category: &str) -> usize {
    self
      .engine()
      .with_products(|products| products.iter().filter(|p| p.category == category).count())
  }

  /// Up to four other held products from the same category.
  pub fn related_products(&self, product: &Product) -> Vec<Product> {
    self.engine().with_products(|products| {
      products
        .iter()
        .filter(|p| p.category == product.category && p.id != product.id)
        .take(MAX_RELATED)
        .cloned()
        .collect()
    })
  }

  pub fn set_search_term(&self, term: impl Into<String>) {
    self.engine().set_search_term(term);
  }

  /// Change criteria and go back to the first page.
  pub fn update_filters(&self, update: impl FnOnce(&mut FilterCriteria)) {
    lock(&self.listing.state).current_page = 1;
    self.engine().update_criteria(update);
  }

  /// Select a category (empty for all) and record the selection.
  pub fn select_category(&self, category: &str) -> JoinHandle<()> {
    lock(&self.listing.state).current_page = 1;
    self.engine().select_category(category);

    let (label, count) = if category.is_empty() {
      (ALL_CATEGORIES, self.engine().with_products(<[Product]>::len))
    } else {
      (category, self.category_count(category))
    };
    self.listing.fetcher.track_event(
      "category_selected",
      json!({ "category": label, "productCount": count }),
    )
  }

  pub fn clear_filters(&self) {
    lock(&self.listing.state).current_page = 1;
    self.engine().clear_filters();
  }

  /// Record that a product's detail view was opened.
  ///
  /// The returned handle resolves once the tracking request has finished.
  pub fn view_product(&self, product: &Product) -> JoinHandle<()> {
    self.listing.fetcher.track_event(
      "product_detail_viewed",
      json!({
        "productId": product.id,
        "productName": product.name,
        "category": product.category,
        "price": product.price,
      }),
    )
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  /// Reload from the network every refresh period.
  pub fn start_auto_refresh(&self) -> bool {
    let listing = self.listing.clone();
    self.sync.start_refresh(move || {
      let listing = listing.clone();
      async move {
        listing.load(true).await;
      }
    })
  }

  pub fn stop_auto_refresh(&self) -> bool {
    self.sync.stop_refresh()
  }

  /// Cancel pending filter work and background tasks, and discard any load
  /// still in flight.
  pub fn teardown(&self) {
    self.listing.requests.invalidate();
    self.engine().teardown();
    self.sync.teardown();
    self.listing.set_loading(false);
    info!("catalog torn down");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::{FakeTransport, Reply};
  use crate::cache::CacheStore;
  use crate::event::Topic;
  use crate::filter::{FilterTimings, PriceRange};
  use crate::sync::SyncIntervals;
  use crate::timer::Scheduler;
  use serde_json::Value;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;
  use tokio::time;

  const PRODUCTS: &str = "/api/v1/products";
  const EVENTS: &str = "/api/v1/analytics/events";

  struct Harness {
    transport: Arc<FakeTransport>,
    scheduler: Scheduler,
    bus: EventBus,
    catalog: Catalog,
  }

  fn harness() -> Harness {
    let transport = Arc::new(FakeTransport::new());
    let scheduler = Scheduler::new();
    let bus = EventBus::new();
    let fetcher = DataFetcher::new(transport.clone(), Arc::new(CacheStore::new()));
    let engine = Arc::new(FilterEngine::new(
      &scheduler,
      bus.clone(),
      FilterTimings::default(),
    ));
    let sync = Arc::new(RealTimeSync::new(
      fetcher.clone(),
      bus.clone(),
      &scheduler,
      SyncIntervals::default(),
    ));
    let catalog = Catalog::new(fetcher, engine, sync, bus.clone(), CatalogSettings::default());
    Harness {
      transport,
      scheduler,
      bus,
      catalog,
    }
  }

  fn listing(items: &[(u64, &str, &str)], total: u64) -> Value {
    let content: Vec<Value> = items
      .iter()
      .map(|(id, name, category)| {
        json!({
          "id": id,
          "name": name,
          "category": category,
          "price": 10.0 * *id as f64,
          "stockQuantity": 5
        })
      })
      .collect();
    json!({ "content": content, "totalElements": total })
  }

  fn names(products: &[Product]) -> Vec<String> {
    products.iter().map(|p| p.name.clone()).collect()
  }

  #[tokio::test(start_paused = true)]
  async fn test_load_installs_products_then_filters() {
    let h = harness();
    h.transport.respond(
      PRODUCTS,
      Reply::Json(listing(&[(1, "Lamp", "home"), (2, "Phone", "tech")], 40)),
    );
    let loaded = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&loaded);
    h.bus.subscribe(Topic::ProductsLoaded, move |event| {
      if let Event::ProductsLoaded { count, total } = event {
        lock(&l).push((*count, *total));
      }
    });

    assert!(h.catalog.load_products().await);

    assert_eq!(*lock(&loaded), vec![(2, 40)]);
    assert_eq!(h.catalog.total_items(), 40);
    assert!(!h.catalog.is_loading());
    assert!(h.catalog.engine().is_filtering());

    time::sleep(Duration::from_millis(101)).await;
    assert!(!h.catalog.engine().is_filtering());
    assert_eq!(names(&h.catalog.engine().visible()), vec!["Lamp", "Phone"]);
  }

  #[tokio::test]
  async fn test_total_falls_back_to_content_length() {
    let h = harness();
    h.transport.respond(PRODUCTS, Reply::Json(listing(&[(1, "Lamp", "home")], 0)));

    h.catalog.load_products().await;
    assert_eq!(h.catalog.total_items(), 1);
  }

  #[tokio::test]
  async fn test_query_omits_category_and_unbounded_price() {
    let h = harness();
    h.transport.respond(PRODUCTS, Reply::Json(listing(&[], 0)));

    h.catalog.engine().select_category("home");
    h.catalog.update_filters(|c| {
      c.price_range = PriceRange {
        min: 10.0,
        max: 1000.0,
      };
      c.in_stock = true;
    });
    h.catalog.set_search_term("  lamp ");
    h.catalog.load_products().await;

    let requests = h.transport.requests();
    let params = &requests[0].params;
    assert_eq!(params.get("page"), Some("0"));
    assert_eq!(params.get("size"), Some("100"));
    assert_eq!(params.get("sort"), Some("name,asc"));
    assert_eq!(params.get("search"), Some("lamp"));
    assert_eq!(params.get("minPrice"), Some("10"));
    assert_eq!(params.get("maxPrice"), None);
    assert_eq!(params.get("inStock"), Some("true"));
    assert_eq!(params.get("category"), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_superseded_load_is_discarded() {
    let h = harness();
    h.transport.enqueue(
      PRODUCTS,
      Reply::Delayed(Duration::from_secs(2), listing(&[(1, "Stale", "home")], 1)),
    );
    h.transport
      .enqueue(PRODUCTS, Reply::Json(listing(&[(2, "Fresh", "home")], 1)));

    let slow = tokio::spawn({
      let catalog = h.catalog.clone();
      async move { catalog.load_products().await }
    });
    time::sleep(Duration::from_millis(10)).await;

    assert!(h.catalog.load_products().await);
    assert!(!slow.await.unwrap());
    assert_eq!(names(&h.catalog.engine().products()), vec!["Fresh"]);
  }

  #[tokio::test]
  async fn test_sort_toggles_same_field_and_resets_on_new_field() {
    let h = harness();
    h.transport.respond(PRODUCTS, Reply::Json(listing(&[], 0)));

    h.catalog.sort("name").await;
    assert_eq!(h.catalog.sort_state(), ("name".to_string(), SortOrder::Desc));

    h.catalog.sort("price").await;
    assert_eq!(h.catalog.sort_state(), ("price".to_string(), SortOrder::Asc));

    let requests = h.transport.requests();
    assert_eq!(requests[0].params.get("sort"), Some("name,desc"));
    assert_eq!(requests[1].params.get("sort"), Some("price,asc"));
  }

  #[tokio::test]
  async fn test_page_numbers_window() {
    let h = harness();
    h.transport.respond(PRODUCTS, Reply::Json(listing(&[], 100)));

    h.catalog.load_products().await;
    assert_eq!(h.catalog.total_pages(), 9);
    assert_eq!(h.catalog.page_numbers(), vec![1, 2, 3]);

    h.catalog.set_page(5).await;
    assert_eq!(h.catalog.page_numbers(), vec![3, 4, 5, 6, 7]);
    assert_eq!(h.transport.requests()[1].params.get("page"), Some("4"));

    h.catalog.set_page(9).await;
    assert_eq!(h.catalog.page_numbers(), vec![7, 8, 9]);
  }

  #[tokio::test]
  async fn test_no_items_no_pages() {
    let h = harness();
    assert!(h.catalog.page_numbers().is_empty());
  }

  #[tokio::test]
  async fn test_related_products_and_category_count() {
    let h = harness();
    let mut items: Vec<(u64, &str, &str)> = (1..=7).map(|id| (id, "Lamp", "home")).collect();
    items.push((8, "Phone", "tech"));
    h.transport.respond(PRODUCTS, Reply::Json(listing(&items, 8)));
    h.catalog.load_products().await;

    let products = h.catalog.engine().products();
    let related = h.catalog.related_products(&products[0]);
    assert_eq!(related.len(), 4);
    assert!(related.iter().all(|p| p.category == "home" && p.id != 1));

    assert_eq!(h.catalog.category_count("home"), 7);
    assert_eq!(h.catalog.category_count("garden"), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_select_category_tracks_selection() {
    let h = harness();
    h.transport.respond(
      PRODUCTS,
      Reply::Json(listing(&[(1, "Lamp", "home"), (2, "Phone", "tech")], 2)),
    );
    h.transport.respond(EVENTS, Reply::Json(json!({})));
    h.catalog.load_products().await;

    h.catalog.select_category("home");
    h.catalog.select_category("");
    time::sleep(Duration::from_millis(1)).await;

    let events: Vec<Value> = h
      .transport
      .requests()
      .into_iter()
      .filter(|r| r.path == EVENTS)
      .filter_map(|r| r.body)
      .collect();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e["event"] == "category_selected"));

    let count_for = |category: &str| {
      events
        .iter()
        .find(|e| e["data"]["category"] == category)
        .map(|e| e["data"]["productCount"].clone())
    };
    assert_eq!(count_for("home"), Some(json!(1)));
    assert_eq!(count_for(ALL_CATEGORIES), Some(json!(2)));
  }

  #[tokio::test]
  async fn test_view_product_handle_completes_after_post() {
    let h = harness();
    h.transport.respond(EVENTS, Reply::Json(json!({})));
    let product: Product = serde_json::from_value(
      json!({ "id": 3, "name": "Desk", "category": "office", "price": 120.0 }),
    )
    .unwrap();

    h.catalog.view_product(&product).await.unwrap();

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].body.clone().unwrap();
    assert_eq!(body["event"], "product_detail_viewed");
    assert_eq!(body["data"]["productId"], 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_auto_refresh_bypasses_cache() {
    let h = harness();
    h.transport
      .respond(PRODUCTS, Reply::Json(listing(&[(1, "Lamp", "home")], 1)));
    h.catalog.load_products().await;
    h.catalog.load_products().await;
    assert_eq!(h.transport.calls_to(PRODUCTS), 1);

    assert!(h.catalog.start_auto_refresh());
    assert!(!h.catalog.start_auto_refresh());
    time::sleep(Duration::from_millis(30_100)).await;
    assert_eq!(h.transport.calls_to(PRODUCTS), 2);

    assert!(h.catalog.stop_auto_refresh());
    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.calls_to(PRODUCTS), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropping_catalog_stops_auto_refresh() {
    let h = harness();
    h.transport
      .respond(PRODUCTS, Reply::Json(listing(&[(1, "Lamp", "home")], 1)));
    let Harness {
      transport,
      scheduler,
      bus,
      catalog,
    } = h;

    assert!(catalog.start_auto_refresh());
    catalog.sync().start_metrics();
    assert_eq!(bus.subscriber_count(Topic::StockChanged), 1);
    drop(catalog);

    assert_eq!(scheduler.pending(), 0);
    assert_eq!(bus.subscriber_count(Topic::StockChanged), 0);
    time::sleep(Duration::from_secs(95)).await;
    assert_eq!(transport.calls_to(PRODUCTS), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_loading_changes_are_announced() {
    let h = harness();
    h.transport.respond(
      PRODUCTS,
      Reply::Delayed(
        Duration::from_millis(50),
        listing(&[(1, "Lamp", "home"), (2, "Phone", "tech")], 2),
      ),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    h.bus.subscribe(Topic::LoadingChanged, move |event| {
      if let Event::LoadingChanged { view, loading } = event {
        lock(&s).push((*view, *loading));
      }
    });
    let started = Arc::new(AtomicUsize::new(0));
    let st = Arc::clone(&started);
    h.bus.subscribe(Topic::FilteringStarted, move |_| {
      st.fetch_add(1, Ordering::SeqCst);
    });

    let catalog = h.catalog.clone();
    let load = tokio::spawn(async move { catalog.load_products().await });
    time::sleep(Duration::from_millis(10)).await;
    assert!(h.catalog.is_loading());
    assert_eq!(*lock(&seen), vec![(View::Catalog, true)]);

    assert!(load.await.unwrap());
    assert_eq!(
      *lock(&seen),
      vec![(View::Catalog, true), (View::Catalog, false)]
    );
    assert_eq!(started.load(Ordering::SeqCst), 1);

    time::sleep(Duration::from_millis(200)).await;
    h.catalog.select_category("home");
    assert!(h.catalog.engine().is_filtering());
    assert_eq!(started.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_failed_load_empties_listing() {
    let h = harness();
    h.transport.respond(PRODUCTS, Reply::Status(500));
    let applied = Arc::new(AtomicUsize::new(0));
    let a = Arc::clone(&applied);
    h.bus.subscribe(Topic::FiltersApplied, move |_| {
      a.fetch_add(1, Ordering::SeqCst);
    });

    assert!(h.catalog.load_products().await);
    assert_eq!(h.catalog.total_items(), 0);
    assert!(h.catalog.engine().visible().is_empty());
    assert_eq!(applied.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_teardown_cancels_everything() {
    let h = harness();
    h.transport
      .respond(PRODUCTS, Reply::Json(listing(&[(1, "Lamp", "home")], 1)));
    h.catalog.load_products().await;
    h.catalog.set_search_term("la");
    h.catalog.start_auto_refresh();
    h.catalog.sync().start_metrics();

    h.catalog.teardown();
    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.bus.subscriber_count(Topic::StockChanged), 0);
  }
}
