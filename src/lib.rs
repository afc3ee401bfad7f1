//! Data-access layer for a catalog and analytics dashboard.
//!
//! Records are fetched over HTTP, cached with a TTL, narrowed client-side by a
//! debounced filter pipeline and kept fresh by periodic polling. Every change
//! that affects rendered state is announced on an [`event::EventBus`], so a
//! presentation layer only ever re-renders in response to notifications.

pub mod analytics;
pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod data_layer;
pub mod event;
pub mod filter;
pub mod logging;
pub mod query;
pub mod sync;
pub mod timer;

pub use analytics::AnalyticsDashboard;
pub use catalog::Catalog;
pub use data_layer::DataLayer;
pub use event::{Event, EventBus, Topic};
pub use filter::{FilterCriteria, FilterEngine};
pub use sync::RealTimeSync;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// All shared state in this crate is plain data that stays consistent between
/// statements, so a poisoned lock carries no torn invariant.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
