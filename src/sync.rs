//! Periodic polling and push-style record updates.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::api::types::{MetricsSnapshot, StockChange};
use crate::api::DataFetcher;
use crate::event::{Event, EventBus, SubscriptionHandle, Subscriptions, Topic};
use crate::filter::FilterEngine;
use crate::lock;
use crate::timer::{PeriodicTask, Scheduler, TaskState};

/// Polling periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncIntervals {
  pub metrics: Duration,
  pub refresh: Duration,
}

impl Default for SyncIntervals {
  fn default() -> Self {
    Self {
      metrics: Duration::from_secs(5),
      refresh: Duration::from_secs(30),
    }
  }
}

/// Keeps displayed data in step with the server.
///
/// Runs two independent periodic tasks, a metrics poll and a consumer-defined
/// refresh, and routes `stock-changed` pushes into attached filter engines.
/// Results of ticks that finish after [`RealTimeSync::teardown`] are dropped.
pub struct RealTimeSync {
  fetcher: DataFetcher,
  bus: EventBus,
  snapshot: Arc<Mutex<MetricsSnapshot>>,
  metrics_task: PeriodicTask,
  refresh_task: PeriodicTask,
  subscriptions: Subscriptions,
  disposed: Arc<AtomicBool>,
}

impl RealTimeSync {
  pub fn new(
    fetcher: DataFetcher,
    bus: EventBus,
    scheduler: &Scheduler,
    intervals: SyncIntervals,
  ) -> Self {
    Self {
      fetcher,
      subscriptions: Subscriptions::new(&bus),
      bus,
      snapshot: Arc::new(Mutex::new(MetricsSnapshot::default())),
      metrics_task: PeriodicTask::new("metrics-poll", scheduler, intervals.metrics),
      refresh_task: PeriodicTask::new("catalog-refresh", scheduler, intervals.refresh),
      disposed: Arc::new(AtomicBool::new(false)),
    }
  }

  /// The most recently stored snapshot.
  pub fn metrics(&self) -> MetricsSnapshot {
    lock(&self.snapshot).clone()
  }

  /// Start polling metrics. No-op (returns false) if already running.
  pub fn start_metrics(&self) -> bool {
    let fetcher = self.fetcher.clone();
    let bus = self.bus.clone();
    let snapshot = Arc::clone(&self.snapshot);
    let disposed = Arc::clone(&self.disposed);

    self.metrics_task.start(move || {
      let fetcher = fetcher.clone();
      let bus = bus.clone();
      let snapshot = Arc::clone(&snapshot);
      let disposed = Arc::clone(&disposed);
      async move { poll_metrics(&fetcher, &bus, &snapshot, &disposed).await }
    })
  }

  pub fn stop_metrics(&self) -> bool {
    self.metrics_task.stop()
  }

  pub fn metrics_state(&self) -> TaskState {
    self.metrics_task.state()
  }

  /// Run one metrics poll now, outside the periodic schedule.
  pub async fn poll_metrics_now(&self) -> MetricsSnapshot {
    poll_metrics(&self.fetcher, &self.bus, &self.snapshot, &self.disposed).await;
    self.metrics()
  }

  /// Start re-running `refresh` every refresh period. No-op (returns false)
  /// if already running.
  pub fn start_refresh<F, Fut>(&self, refresh: F) -> bool
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let disposed = Arc::clone(&self.disposed);
    self.refresh_task.start(move || {
      let run = (!disposed.load(Ordering::Acquire)).then(&refresh);
      async move {
        if let Some(run) = run {
          run.await;
        }
      }
    })
  }

  pub fn stop_refresh(&self) -> bool {
    self.refresh_task.stop()
  }

  pub fn refresh_state(&self) -> TaskState {
    self.refresh_task.state()
  }

  /// Route `stock-changed` events into `engine`.
  pub fn attach_stock_updates(&self, engine: Arc<FilterEngine>) -> SubscriptionHandle {
    self.subscriptions.subscribe(Topic::StockChanged, move |event| {
      if let Event::StockChanged(change) = event {
        if !engine.apply_stock_change(change) {
          debug!(id = change.id, "stock change for product not held, ignoring");
        }
      }
    })
  }

  /// Publish a pushed stock change to every attached consumer.
  pub fn push_stock_change(&self, change: StockChange) {
    self.bus.publish(Event::StockChanged(change));
  }

  /// Stop both tasks, drop subscriptions and discard in-flight tick results.
  pub fn teardown(&self) {
    self.disposed.store(true, Ordering::Release);
    self.metrics_task.stop();
    self.refresh_task.stop();
    self.subscriptions.clear();
    info!("real-time sync torn down");
  }
}

/// One metrics tick: fetch, store, publish. A failed fetch stores and
/// publishes the zeroed snapshot.
async fn poll_metrics(
  fetcher: &DataFetcher,
  bus: &EventBus,
  snapshot: &Mutex<MetricsSnapshot>,
  disposed: &AtomicBool,
) {
  let metrics = fetcher.realtime_metrics().await;

  if disposed.load(Ordering::Acquire) {
    debug!("discarding metrics for disposed sync");
    return;
  }

  *lock(snapshot) = metrics.clone();
  bus.publish(Event::MetricsUpdated(metrics));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::{FakeTransport, Reply};
  use crate::api::types::Product;
  use crate::cache::CacheStore;
  use crate::filter::FilterTimings;
  use serde_json::json;
  use std::sync::atomic::AtomicUsize;
  use tokio::time;

  const REALTIME: &str = "/api/v1/analytics/realtime";

  struct Harness {
    transport: Arc<FakeTransport>,
    scheduler: Scheduler,
    bus: EventBus,
    sync: RealTimeSync,
    metrics_seen: Arc<Mutex<Vec<MetricsSnapshot>>>,
  }

  fn harness() -> Harness {
    let transport = Arc::new(FakeTransport::new());
    let scheduler = Scheduler::new();
    let bus = EventBus::new();
    let fetcher = DataFetcher::new(transport.clone(), Arc::new(CacheStore::new()));
    let sync = RealTimeSync::new(fetcher, bus.clone(), &scheduler, SyncIntervals::default());

    let metrics_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&metrics_seen);
    bus.subscribe(Topic::MetricsUpdated, move |event| {
      if let Event::MetricsUpdated(m) = event {
        lock(&seen).push(m.clone());
      }
    });

    Harness {
      transport,
      scheduler,
      bus,
      sync,
      metrics_seen,
    }
  }

  fn live_metrics(active_users: u64) -> Reply {
    Reply::Json(json!({
      "activeUsers": active_users,
      "currentSales": 1250.5,
      "topProducts": [{ "name": "Laptop" }],
      "recentOrders": []
    }))
  }

  #[tokio::test(start_paused = true)]
  async fn test_metrics_published_every_period() {
    let h = harness();
    h.transport.respond(REALTIME, live_metrics(45));

    assert!(h.sync.start_metrics());
    time::sleep(Duration::from_millis(4_900)).await;
    assert!(lock(&h.metrics_seen).is_empty());

    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(lock(&h.metrics_seen).len(), 1);
    assert_eq!(h.sync.metrics().active_users, 45);

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(lock(&h.metrics_seen).len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_poll_publishes_zeroed_snapshot() {
    let h = harness();
    h.transport.enqueue(REALTIME, live_metrics(45));
    h.transport.enqueue(REALTIME, Reply::Status(500));

    h.sync.start_metrics();
    time::sleep(Duration::from_millis(10_100)).await;

    let seen = lock(&h.metrics_seen).clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].active_users, 45);
    assert_eq!(seen[1], MetricsSnapshot::default());
    assert_eq!(h.sync.metrics(), MetricsSnapshot::default());
  }

  #[tokio::test(start_paused = true)]
  async fn test_restart_leaves_one_timer() {
    let h = harness();
    h.transport.respond(REALTIME, live_metrics(1));

    assert!(h.sync.start_metrics());
    assert!(!h.sync.start_metrics());
    assert_eq!(h.scheduler.pending(), 1);

    assert!(h.sync.stop_metrics());
    assert_eq!(h.sync.metrics_state(), TaskState::Stopped);
    assert!(h.sync.start_metrics());
    assert_eq!(h.scheduler.pending(), 1);

    time::sleep(Duration::from_millis(10_100)).await;
    assert_eq!(lock(&h.metrics_seen).len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_tasks_are_independent() {
    let h = harness();
    h.transport.respond(REALTIME, live_metrics(1));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&refreshes);

    h.sync.start_metrics();
    h.sync.start_refresh(move || {
      r.fetch_add(1, Ordering::SeqCst);
      async {}
    });
    assert_eq!(h.scheduler.pending(), 2);

    h.sync.stop_metrics();
    assert_eq!(h.sync.refresh_state(), TaskState::Running);

    time::sleep(Duration::from_millis(60_100)).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    assert!(lock(&h.metrics_seen).is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_teardown_discards_in_flight_poll() {
    let h = harness();
    h.transport.respond(
      REALTIME,
      Reply::Delayed(Duration::from_secs(2), json!({ "activeUsers": 9 })),
    );

    h.sync.start_metrics();
    time::sleep(Duration::from_millis(5_100)).await;

    // The tick's request is still in flight
    h.sync.teardown();
    assert_eq!(h.scheduler.pending(), 0);

    time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.transport.calls_to(REALTIME), 1);
    assert!(lock(&h.metrics_seen).is_empty());
    assert_eq!(h.sync.metrics(), MetricsSnapshot::default());
  }

  #[tokio::test]
  async fn test_stock_push_updates_attached_engine() {
    let h = harness();
    let engine = Arc::new(FilterEngine::new(
      &h.scheduler,
      h.bus.clone(),
      FilterTimings::default(),
    ));
    engine.set_products(vec![Product {
      id: 3,
      name: "Lamp".to_string(),
      description: String::new(),
      category: "home".to_string(),
      price: 25.0,
      stock_quantity: 8,
      image_url: None,
      active: true,
      rating: None,
    }]);

    let updates = Arc::new(AtomicUsize::new(0));
    let u = Arc::clone(&updates);
    h.bus.subscribe(Topic::ProductUpdated, move |_| {
      u.fetch_add(1, Ordering::SeqCst);
    });

    h.sync.attach_stock_updates(Arc::clone(&engine));
    h.sync.push_stock_change(StockChange {
      id: 3,
      new_stock: 0,
    });
    h.sync.push_stock_change(StockChange {
      id: 77,
      new_stock: 4,
    });

    assert_eq!(engine.products()[0].stock_quantity, 0);
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    h.sync.teardown();
    assert_eq!(h.bus.subscriber_count(Topic::StockChanged), 0);
  }

  #[tokio::test]
  async fn test_poll_now_stores_snapshot() {
    let h = harness();
    h.transport.respond(REALTIME, live_metrics(12));

    let metrics = h.sync.poll_metrics_now().await;
    assert_eq!(metrics.active_users, 12);
    assert_eq!(metrics.top_products.len(), 1);
    assert_eq!(lock(&h.metrics_seen).len(), 1);
  }
}
