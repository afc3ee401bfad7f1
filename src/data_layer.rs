//! Composition root.
//!
//! A [`DataLayer`] owns the single instances every consumer shares: the
//! notification bus, the timer scheduler, the response cache and the fetcher.
//! Consumers (filter engines, real-time sync, catalogs, dashboards) are built from it so
//! that they all see the same cache and publish on the same bus.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::info;

use crate::analytics::AnalyticsDashboard;
use crate::api::{DataFetcher, HttpTransport, Transport};
use crate::cache::CacheStore;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::event::EventBus;
use crate::filter::FilterEngine;
use crate::sync::RealTimeSync;
use crate::timer::Scheduler;

pub struct DataLayer {
  config: Config,
  bus: EventBus,
  scheduler: Scheduler,
  cache: Arc<CacheStore>,
  fetcher: DataFetcher,
}

impl DataLayer {
  /// Build a data layer talking HTTP to `config.api.base_url`.
  pub fn new(config: &Config) -> Result<Self> {
    let transport = HttpTransport::new(&config.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;
    info!(base_url = %transport.base_url(), "data layer ready");
    Ok(Self::with_transport(config, Arc::new(transport)))
  }

  /// Build a data layer over any transport.
  pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
    let cache = Arc::new(CacheStore::with_ttl(config.cache_ttl()));
    let fetcher = DataFetcher::new(transport, Arc::clone(&cache))
      .with_timeout(config.request_timeout())
      .with_context(config.event_context());

    Self {
      config: config.clone(),
      bus: EventBus::new(),
      scheduler: Scheduler::new(),
      cache,
      fetcher,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn bus(&self) -> &EventBus {
    &self.bus
  }

  pub fn scheduler(&self) -> &Scheduler {
    &self.scheduler
  }

  pub fn cache(&self) -> &Arc<CacheStore> {
    &self.cache
  }

  pub fn fetcher(&self) -> &DataFetcher {
    &self.fetcher
  }

  pub fn filter_engine(&self) -> Arc<FilterEngine> {
    Arc::new(FilterEngine::new(
      &self.scheduler,
      self.bus.clone(),
      self.config.filter_timings(),
    ))
  }

  pub fn realtime_sync(&self) -> Arc<RealTimeSync> {
    Arc::new(RealTimeSync::new(
      self.fetcher.clone(),
      self.bus.clone(),
      &self.scheduler,
      self.config.sync_intervals(),
    ))
  }

  /// A catalog with its own filter engine and sync, wired for stock pushes.
  pub fn catalog(&self) -> Catalog {
    Catalog::new(
      self.fetcher.clone(),
      self.filter_engine(),
      self.realtime_sync(),
      self.bus.clone(),
      self.config.catalog_settings(),
    )
  }

  /// An analytics dashboard with its own sync.
  pub fn analytics(&self) -> AnalyticsDashboard {
    AnalyticsDashboard::new(self.fetcher.clone(), self.realtime_sync(), self.bus.clone())
  }

  /// Cancel every timer any consumer scheduled.
  pub fn shutdown(&self) {
    self.scheduler.cancel_all();
  }
}
