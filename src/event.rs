//! Topic-based notification bus.
//!
//! Delivery is synchronous: [`EventBus::publish`] calls every handler
//! subscribed to the event's topic, in registration order, before returning.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{error, trace};

use crate::api::types::{AnalyticsReport, MetricsSnapshot, Product, StockChange};
use crate::lock;

/// Notification topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
  MetricsUpdated,
  StockChanged,
  ProductsLoaded,
  ProductUpdated,
  FilteringStarted,
  FiltersApplied,
  LoadingChanged,
  AnalyticsUpdated,
}

impl Topic {
  pub fn as_str(&self) -> &'static str {
    match self {
      Topic::MetricsUpdated => "metrics-updated",
      Topic::StockChanged => "stock-changed",
      Topic::ProductsLoaded => "products-loaded",
      Topic::ProductUpdated => "product-updated",
      Topic::FilteringStarted => "filtering-started",
      Topic::FiltersApplied => "filters-applied",
      Topic::LoadingChanged => "loading-changed",
      Topic::AnalyticsUpdated => "analytics-updated",
    }
  }
}

impl fmt::Display for Topic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A published notification. Each variant belongs to exactly one topic.
#[derive(Debug, Clone)]
pub enum Event {
  /// A fresh (or zeroed) metrics snapshot
  MetricsUpdated(MetricsSnapshot),
  /// Server push: a product's stock changed
  StockChanged(StockChange),
  /// A product listing replaced the held record set
  ProductsLoaded { count: usize, total: u64 },
  /// A held record was mutated in place
  ProductUpdated(Product),
  /// A recomputation of the visible subset was scheduled
  FilteringStarted,
  /// The visible subset was recomputed
  FiltersApplied { visible: usize, total: usize },
  /// A view started or finished loading from the server
  LoadingChanged { view: View, loading: bool },
  /// A fresh (or zeroed) analytics report
  AnalyticsUpdated(AnalyticsReport),
}

/// Consumers that report their loading state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
  Catalog,
  Analytics,
}

impl Event {
  pub fn topic(&self) -> Topic {
    match self {
      Event::MetricsUpdated(_) => Topic::MetricsUpdated,
      Event::StockChanged(_) => Topic::StockChanged,
      Event::ProductsLoaded { .. } => Topic::ProductsLoaded,
      Event::ProductUpdated(_) => Topic::ProductUpdated,
      Event::FilteringStarted => Topic::FilteringStarted,
      Event::FiltersApplied { .. } => Topic::FiltersApplied,
      Event::LoadingChanged { .. } => Topic::LoadingChanged,
      Event::AnalyticsUpdated(_) => Topic::AnalyticsUpdated,
    }
  }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Returned by [`EventBus::subscribe`]; pass to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
  topic: Topic,
  id: u64,
}

#[derive(Default)]
struct Registry {
  next_id: u64,
  handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

/// Shared publish/subscribe channel. Clones refer to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
  registry: Arc<Mutex<Registry>>,
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
  where
    F: Fn(&Event) + Send + Sync + 'static,
  {
    let mut registry = lock(&self.registry);
    let id = registry.next_id;
    registry.next_id += 1;
    registry
      .handlers
      .entry(topic)
      .or_default()
      .push((id, Arc::new(handler)));
    SubscriptionHandle { topic, id }
  }

  /// Remove a subscription. Returns false if it was already gone.
  pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
    let mut registry = lock(&self.registry);
    let Some(handlers) = registry.handlers.get_mut(&handle.topic) else {
      return false;
    };
    let before = handlers.len();
    handlers.retain(|(id, _)| *id != handle.id);
    before != handlers.len()
  }

  /// Deliver `event` to the current subscribers of its topic.
  ///
  /// Handlers subscribed while delivery is in progress miss this event. A
  /// handler that panics is logged and skipped. Returns the number of handlers
  /// that completed.
  pub fn publish(&self, event: Event) -> usize {
    let topic = event.topic();
    // Snapshot so handlers may (un)subscribe or publish without deadlocking
    let handlers: Vec<Handler> = lock(&self.registry)
      .handlers
      .get(&topic)
      .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
      .unwrap_or_default();

    let mut delivered = 0;
    for handler in handlers {
      match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
        Ok(()) => delivered += 1,
        Err(_) => error!(%topic, "subscriber panicked, continuing delivery"),
      }
    }
    trace!(%topic, delivered, "published");
    delivered
  }

  pub fn subscriber_count(&self, topic: Topic) -> usize {
    lock(&self.registry)
      .handlers
      .get(&topic)
      .map(Vec::len)
      .unwrap_or(0)
  }
}

/// Subscriptions owned by one consumer, released together.
///
/// Dropping the set unsubscribes everything it holds.
pub struct Subscriptions {
  bus: EventBus,
  handles: Mutex<Vec<SubscriptionHandle>>,
}

impl Subscriptions {
  pub fn new(bus: &EventBus) -> Self {
    Self {
      bus: bus.clone(),
      handles: Mutex::new(Vec::new()),
    }
  }

  pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
  where
    F: Fn(&Event) + Send + Sync + 'static,
  {
    let handle = self.bus.subscribe(topic, handler);
    lock(&self.handles).push(handle);
    handle
  }

  pub fn len(&self) -> usize {
    lock(&self.handles).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Unsubscribe everything held so far.
  pub fn clear(&self) {
    let handles: Vec<_> = lock(&self.handles).drain(..).collect();
    for handle in handles {
      self.bus.unsubscribe(handle);
    }
  }
}

impl Drop for Subscriptions {
  fn drop(&mut self) {
    self.clear();
  }
}
