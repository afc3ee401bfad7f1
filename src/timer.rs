//! Cancellable timers for debounced, throttled and periodic work.
//!
//! Every timer in the crate goes through a [`Scheduler`], which hands out a
//! [`TimerHandle`] per scheduled callback. Cancelling a handle guarantees the
//! callback never runs; teardown code can cancel everything at once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::lock;

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Default)]
struct Timers {
  next_id: u64,
  active: HashMap<u64, AbortHandle>,
}

/// Registry of pending timers backed by tokio tasks.
#[derive(Clone, Default)]
pub struct Scheduler {
  timers: Arc<Mutex<Timers>>,
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `f` once after `delay`.
  pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
  where
    F: FnOnce() + Send + 'static,
  {
    // The registry lock is held across the spawn so the task can never
    // deregister itself before it has been registered.
    let mut timers = lock(&self.timers);
    let id = timers.next_id;
    timers.next_id += 1;

    let registry = Arc::clone(&self.timers);
    let task = tokio::spawn(async move {
      time::sleep(delay).await;
      // Deregister before running so the callback may reschedule freely
      lock(&registry).active.remove(&id);
      f();
    });

    timers.active.insert(id, task.abort_handle());
    TimerHandle(id)
  }

  /// Run `tick` every `period`, first firing one period from now.
  ///
  /// Each tick's future is spawned on its own, so cancelling the timer stops
  /// future ticks without aborting work a previous tick already started.
  pub fn every<F, Fut>(&self, period: Duration, mut tick: F) -> TimerHandle
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let period = period.max(Duration::from_millis(1));

    let mut timers = lock(&self.timers);
    let id = timers.next_id;
    timers.next_id += 1;

    let task = tokio::spawn(async move {
      let mut interval = time::interval_at(Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        tokio::spawn(tick());
      }
    });

    timers.active.insert(id, task.abort_handle());
    TimerHandle(id)
  }

  /// Cancel a timer. Returns false if it already fired or was cancelled.
  pub fn cancel(&self, handle: TimerHandle) -> bool {
    match lock(&self.timers).active.remove(&handle.0) {
      Some(task) => {
        task.abort();
        true
      }
      None => false,
    }
  }

  /// Whether the timer is still waiting to fire (or, for repeating timers,
  /// still running).
  pub fn is_pending(&self, handle: TimerHandle) -> bool {
    lock(&self.timers).active.contains_key(&handle.0)
  }

  /// Number of live timers.
  pub fn pending(&self) -> usize {
    lock(&self.timers).active.len()
  }

  /// Deregister a timer without aborting it, as a timer does just before
  /// running its callback.
  #[cfg(test)]
  fn forget(&self, handle: TimerHandle) {
    lock(&self.timers).active.remove(&handle.0);
  }

  /// Cancel every live timer.
  pub fn cancel_all(&self) {
    let drained: Vec<AbortHandle> = lock(&self.timers)
      .active
      .drain()
      .map(|(_, task)| task)
      .collect();
    if !drained.is_empty() {
      debug!(count = drained.len(), "cancelled all timers");
    }
    for task in drained {
      task.abort();
    }
  }
}

/// Collapses a burst of calls into one, run `delay` after the last call.
///
/// Each call bumps a generation; a scheduled callback only runs if no later
/// call or cancel happened, even if its timer already left the registry.
pub struct Debouncer {
  scheduler: Scheduler,
  delay: Duration,
  pending: Mutex<Option<TimerHandle>>,
  generation: Arc<AtomicU64>,
}

impl Debouncer {
  pub fn new(scheduler: &Scheduler, delay: Duration) -> Self {
    Self {
      scheduler: scheduler.clone(),
      delay,
      pending: Mutex::new(None),
      generation: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Cancel any pending call and schedule `f` in its place.
  pub fn call<F>(&self, f: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let mut pending = lock(&self.pending);
    if let Some(handle) = pending.take() {
      self.scheduler.cancel(handle);
    }
    let current = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
    let generation = Arc::clone(&self.generation);
    *pending = Some(self.scheduler.schedule(self.delay, move || {
      if generation.load(Ordering::Acquire) == current {
        f();
      }
    }));
  }

  /// Drop the pending call, if any.
  pub fn cancel(&self) -> bool {
    let mut pending = lock(&self.pending);
    self.generation.fetch_add(1, Ordering::AcqRel);
    match pending.take() {
      Some(handle) => self.scheduler.cancel(handle),
      None => false,
    }
  }

  pub fn is_pending(&self) -> bool {
    lock(&self.pending)
      .map(|handle| self.scheduler.is_pending(handle))
      .unwrap_or(false)
  }
}

/// Runs at most one call per window.
///
/// The first call in an idle window is scheduled for the end of the window;
/// calls arriving while it is pending are dropped. Callers therefore pass
/// closures that read current state when they run rather than capturing it.
pub struct Throttler {
  scheduler: Scheduler,
  window: Duration,
  pending: Mutex<Option<TimerHandle>>,
}

impl Throttler {
  pub fn new(scheduler: &Scheduler, window: Duration) -> Self {
    Self {
      scheduler: scheduler.clone(),
      window,
      pending: Mutex::new(None),
    }
  }

  /// Schedule `f` unless a call is already pending in this window.
  ///
  /// Returns true if `f` was scheduled.
  pub fn call<F>(&self, f: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    let mut pending = lock(&self.pending);
    if let Some(handle) = *pending {
      if self.scheduler.is_pending(handle) {
        return false;
      }
    }
    *pending = Some(self.scheduler.schedule(self.window, f));
    true
  }

  pub fn cancel(&self) -> bool {
    match lock(&self.pending).take() {
      Some(handle) => self.scheduler.cancel(handle),
      None => false,
    }
  }
}

/// Lifecycle of a [`PeriodicTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Stopped,
  Running,
}

/// A named repeating job that is either stopped or running exactly once.
pub struct PeriodicTask {
  name: &'static str,
  period: Duration,
  scheduler: Scheduler,
  handle: Mutex<Option<TimerHandle>>,
}

impl PeriodicTask {
  pub fn new(name: &'static str, scheduler: &Scheduler, period: Duration) -> Self {
    Self {
      name,
      period,
      scheduler: scheduler.clone(),
      handle: Mutex::new(None),
    }
  }

  /// Start ticking. Starting a running task is a no-op and returns false.
  pub fn start<F, Fut>(&self, tick: F) -> bool
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let mut handle = lock(&self.handle);
    if let Some(current) = *handle {
      if self.scheduler.is_pending(current) {
        debug!(task = self.name, "already running");
        return false;
      }
    }
    *handle = Some(self.scheduler.every(self.period, tick));
    debug!(task = self.name, period = ?self.period, "started");
    true
  }

  /// Stop ticking. Returns false if the task was not running.
  pub fn stop(&self) -> bool {
    let stopped = match lock(&self.handle).take() {
      Some(handle) => self.scheduler.cancel(handle),
      None => false,
    };
    if stopped {
      debug!(task = self.name, "stopped");
    }
    stopped
  }

  pub fn state(&self) -> TaskState {
    match *lock(&self.handle) {
      Some(handle) if self.scheduler.is_pending(handle) => TaskState::Running,
      _ => TaskState::Stopped,
    }
  }
}

impl Drop for PeriodicTask {
  fn drop(&mut self) {
    self.stop();
  }
}
