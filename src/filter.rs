//! Client-side filtering of the held product set.
//!
//! [`FilterCriteria`] decides which products are visible; [`FilterEngine`]
//! owns the full and visible sets and schedules recomputation. Search edits
//! are debounced, other control changes are throttled, and every
//! recomputation runs after a short yield so a loading state can be shown
//! first.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::api::types::{Product, StockChange};
use crate::event::{Event, EventBus};
use crate::lock;
use crate::timer::{Debouncer, Scheduler, Throttler};

/// Price at or above which the upper bound is considered unrestricted.
pub const PRICE_CEILING: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
  pub min: f64,
  pub max: f64,
}

impl Default for PriceRange {
  fn default() -> Self {
    Self {
      min: 0.0,
      max: PRICE_CEILING,
    }
  }
}

impl PriceRange {
  /// Lower bound, if one is in effect.
  pub fn lower_bound(&self) -> Option<f64> {
    (self.min > 0.0).then_some(self.min)
  }

  /// Upper bound, if one is in effect.
  pub fn upper_bound(&self) -> Option<f64> {
    (self.max > 0.0 && self.max < PRICE_CEILING).then_some(self.max)
  }
}

/// User-selected constraints on the visible products.
///
/// The default value constrains nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
  pub search_term: String,
  /// Exact category name; empty means all categories
  pub category: String,
  pub price_range: PriceRange,
  pub in_stock: bool,
  /// Carried with the criteria; products have no rating predicate
  pub min_rating: f64,
}

impl FilterCriteria {
  /// Lowercased search term, or `None` when it is blank.
  fn search_needle(&self) -> Option<String> {
    if self.search_term.trim().is_empty() {
      None
    } else {
      Some(self.search_term.to_lowercase())
    }
  }

  pub fn matches(&self, product: &Product) -> bool {
    self.matcher().matches(product)
  }

  /// Products passing every active constraint, in their original order.
  pub fn filter(&self, products: &[Product]) -> Vec<Product> {
    let matcher = self.matcher();
    products
      .iter()
      .filter(|p| matcher.matches(p))
      .cloned()
      .collect()
  }

  fn matcher(&self) -> Matcher<'_> {
    Matcher {
      needle: self.search_needle(),
      criteria: self,
    }
  }
}

/// Criteria with the search term lowercased once.
struct Matcher<'a> {
  needle: Option<String>,
  criteria: &'a FilterCriteria,
}

impl Matcher<'_> {
  fn matches(&self, product: &Product) -> bool {
    if let Some(needle) = &self.needle {
      let hit = product.name.to_lowercase().contains(needle.as_str())
        || product.description.to_lowercase().contains(needle.as_str());
      if !hit {
        return false;
      }
    }

    if !self.criteria.category.is_empty() && product.category != self.criteria.category {
      return false;
    }

    let range = &self.criteria.price_range;
    if range.lower_bound().is_some_and(|min| product.price < min) {
      return false;
    }
    if range.upper_bound().is_some_and(|max| product.price > max) {
      return false;
    }

    !(self.criteria.in_stock && product.stock_quantity <= 0)
  }
}

/// Delays used by the filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterTimings {
  pub search_debounce: Duration,
  pub throttle: Duration,
  pub apply_delay: Duration,
}

impl Default for FilterTimings {
  fn default() -> Self {
    Self {
      search_debounce: Duration::from_millis(300),
      throttle: Duration::from_millis(100),
      apply_delay: Duration::from_millis(100),
    }
  }
}

#[derive(Default)]
struct FilterState {
  criteria: FilterCriteria,
  products: Vec<Product>,
  visible: Vec<Product>,
  filtering: bool,
}

/// State and the apply step, shared with scheduled callbacks.
struct Shared {
  state: Mutex<FilterState>,
  bus: EventBus,
  apply: Debouncer,
}

impl Shared {
  fn apply_filters(self: &Arc<Self>) {
    let started = {
      let mut state = lock(&self.state);
      if state.products.is_empty() {
        state.visible.clear();
        state.filtering = false;
        drop(state);
        self.apply.cancel();
        debug!("no products to filter");
        self.bus.publish(Event::FiltersApplied {
          visible: 0,
          total: 0,
        });
        return;
      }
      let started = !state.filtering;
      state.filtering = true;
      started
    };

    let shared = Arc::clone(self);
    self.apply.call(move || shared.recompute());
    if started {
      self.bus.publish(Event::FilteringStarted);
    }
  }

  fn recompute(&self) {
    let (visible, total) = {
      let mut state = lock(&self.state);
      let visible = state.criteria.filter(&state.products);
      state.visible = visible;
      state.filtering = false;
      (state.visible.len(), state.products.len())
    };
    debug!(visible, total, "filters applied");
    self.bus.publish(Event::FiltersApplied { visible, total });
  }
}

/// Holds the product set and recomputes its visible subset on demand.
pub struct FilterEngine {
  shared: Arc<Shared>,
  search: Debouncer,
  throttle: Throttler,
}

impl FilterEngine {
  pub fn new(scheduler: &Scheduler, bus: EventBus, timings: FilterTimings) -> Self {
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(FilterState::default()),
        bus,
        apply: Debouncer::new(scheduler, timings.apply_delay),
      }),
      search: Debouncer::new(scheduler, timings.search_debounce),
      throttle: Throttler::new(scheduler, timings.throttle),
    }
  }

  pub fn criteria(&self) -> FilterCriteria {
    lock(&self.shared.state).criteria.clone()
  }

  /// The full product set.
  pub fn products(&self) -> Vec<Product> {
    lock(&self.shared.state).products.clone()
  }

  /// Products passing the criteria as of the last recomputation.
  pub fn visible(&self) -> Vec<Product> {
    lock(&self.shared.state).visible.clone()
  }

  /// Run `f` against the full product set without cloning it.
  pub fn with_products<R>(&self, f: impl FnOnce(&[Product]) -> R) -> R {
    f(&lock(&self.shared.state).products)
  }

  /// True between scheduling a recomputation and finishing it.
  pub fn is_filtering(&self) -> bool {
    lock(&self.shared.state).filtering
  }

  /// Replace the full set. Until the next recomputation every product is
  /// visible.
  pub fn set_products(&self, products: Vec<Product>) {
    let mut state = lock(&self.shared.state);
    state.visible = products.clone();
    state.products = products;
  }

  /// Recompute the visible subset after the apply delay. An empty product
  /// set empties the visible subset immediately.
  pub fn apply_filters(&self) {
    self.shared.apply_filters();
  }

  /// Update the search term and recompute once typing pauses.
  pub fn set_search_term(&self, term: impl Into<String>) {
    lock(&self.shared.state).criteria.search_term = term.into();
    let shared = Arc::clone(&self.shared);
    self.search.call(move || shared.apply_filters());
  }

  /// Change any criteria and recompute at most once per throttle window.
  pub fn update_criteria(&self, update: impl FnOnce(&mut FilterCriteria)) {
    update(&mut lock(&self.shared.state).criteria);
    let shared = Arc::clone(&self.shared);
    self.throttle.call(move || shared.apply_filters());
  }

  /// Select a category (empty for all) and recompute right away.
  pub fn select_category(&self, category: impl Into<String>) {
    lock(&self.shared.state).criteria.category = category.into();
    self.shared.apply_filters();
  }

  /// Reset every constraint and recompute.
  pub fn clear_filters(&self) {
    lock(&self.shared.state).criteria = FilterCriteria::default();
    self.shared.apply_filters();
  }

  /// Set a held product's stock level in place.
  ///
  /// Returns false, without notifying, when no held product has the id.
  pub fn apply_stock_change(&self, change: &StockChange) -> bool {
    let updated = {
      let mut state = lock(&self.shared.state);
      let Some(product) = state.products.iter_mut().find(|p| p.id == change.id) else {
        return false;
      };
      product.stock_quantity = change.new_stock;
      let updated = product.clone();
      if let Some(shown) = state.visible.iter_mut().find(|p| p.id == change.id) {
        shown.stock_quantity = change.new_stock;
      }
      updated
    };

    debug!(id = change.id, stock = change.new_stock, "stock updated");
    self.shared.bus.publish(Event::ProductUpdated(updated));
    true
  }

  /// Cancel every pending recomputation.
  pub fn teardown(&self) {
    self.search.cancel();
    self.throttle.cancel();
    self.shared.apply.cancel();
    lock(&self.shared.state).filtering = false;
  }
}
