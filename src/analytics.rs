//! Analytics dashboard view model.
//!
//! Holds the current sales report and its filters, mirrors live metrics from
//! the bus and reloads the report in the background.

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::api::types::{AnalyticsQuery, AnalyticsReport, MetricsSnapshot};
use crate::api::DataFetcher;
use crate::event::{Event, EventBus, Subscriptions, Topic, View};
use crate::lock;
use crate::query::RequestTracker;
use crate::sync::RealTimeSync;

#[derive(Debug, Default)]
struct DashboardState {
  report: AnalyticsReport,
  filters: AnalyticsQuery,
  metrics: MetricsSnapshot,
  loading: bool,
}

/// Loads reports. Kept apart from the sync so refresh ticks hold no
/// reference back to it.
#[derive(Clone)]
struct ReportLoader {
  fetcher: DataFetcher,
  bus: EventBus,
  requests: RequestTracker,
  state: Arc<Mutex<DashboardState>>,
}

impl ReportLoader {
  fn set_loading(&self, loading: bool) {
    let changed = {
      let mut state = lock(&self.state);
      std::mem::replace(&mut state.loading, loading) != loading
    };
    if changed {
      self.bus.publish(Event::LoadingChanged {
        view: View::Analytics,
        loading,
      });
    }
  }

  async fn load(&self) -> bool {
    let ticket = self.requests.begin();
    let query = lock(&self.state).filters.clone();
    self.set_loading(true);

    let report = self.fetcher.analytics(&query).await;

    if !self.requests.is_current(ticket) {
      debug!("discarding superseded analytics report");
      return false;
    }
    lock(&self.state).report = report.clone();
    self.set_loading(false);
    debug!(orders = report.orders, revenue = report.revenue, "analytics loaded");
    self.bus.publish(Event::AnalyticsUpdated(report));
    true
  }
}

/// The sales dashboard. Dropping it stops its background tasks.
pub struct AnalyticsDashboard {
  loader: ReportLoader,
  sync: Arc<RealTimeSync>,
  subscriptions: Subscriptions,
}

impl AnalyticsDashboard {
  pub fn new(fetcher: DataFetcher, sync: Arc<RealTimeSync>, bus: EventBus) -> Self {
    let state = Arc::new(Mutex::new(DashboardState::default()));
    let subscriptions = Subscriptions::new(&bus);

    let s = Arc::clone(&state);
    subscriptions.subscribe(Topic::MetricsUpdated, move |event| {
      if let Event::MetricsUpdated(metrics) = event {
        lock(&s).metrics = metrics.clone();
      }
    });

    Self {
      loader: ReportLoader {
        fetcher,
        bus,
        requests: RequestTracker::new(),
        state,
      },
      sync,
      subscriptions,
    }
  }

  /// Load the report, start polling metrics and, if `auto_refresh`, reload
  /// every refresh period.
  pub async fn init(&self, auto_refresh: bool) -> bool {
    let loaded = self.load().await;
    self.sync.start_metrics();
    if auto_refresh {
      self.start_auto_refresh();
    }
    loaded
  }

  pub fn sync(&self) -> &RealTimeSync {
    &self.sync
  }

  pub fn report(&self) -> AnalyticsReport {
    lock(&self.loader.state).report.clone()
  }

  pub fn filters(&self) -> AnalyticsQuery {
    lock(&self.loader.state).filters.clone()
  }

  /// Latest live metrics seen on the bus.
  pub fn metrics(&self) -> MetricsSnapshot {
    lock(&self.loader.state).metrics.clone()
  }

  pub fn is_loading(&self) -> bool {
    lock(&self.loader.state).loading
  }

  /// Fetch the report for the current filters.
  ///
  /// Returns false if a newer load superseded this one.
  pub async fn load(&self) -> bool {
    self.loader.load().await
  }

  /// Change the filters and reload.
  pub async fn set_filters(&self, update: impl FnOnce(&mut AnalyticsQuery)) -> bool {
    update(&mut lock(&self.loader.state).filters);
    self.load().await
  }

  pub fn start_auto_refresh(&self) -> bool {
    let loader = self.loader.clone();
    self.sync.start_refresh(move || {
      let loader = loader.clone();
      async move {
        loader.load().await;
      }
    })
  }

  pub fn stop_auto_refresh(&self) -> bool {
    self.sync.stop_refresh()
  }

  /// Start or stop auto refresh.
  pub fn toggle_auto_refresh(&self, enabled: bool) -> bool {
    if enabled {
      self.start_auto_refresh()
    } else {
      self.stop_auto_refresh()
    }
  }

  /// Sales rows of the current report as CSV.
  pub fn sales_csv(&self) -> String {
    lock(&self.loader.state).report.sales_csv()
  }

  pub fn teardown(&self) {
    self.loader.requests.invalidate();
    self.sync.teardown();
    self.subscriptions.clear();
    self.loader.set_loading(false);
    info!("analytics dashboard torn down");
  }
}
