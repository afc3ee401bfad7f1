//! Request generations for discarding out-of-order responses.
//!
//! A consumer that may have several loads in flight takes a ticket before
//! each request and checks it when the response arrives. Only the most
//! recently issued ticket is current, so a slow response to an older request
//! can never overwrite the result of a newer one.
//!
//! # Example
//!
//! ```ignore
//! let ticket = tracker.begin();
//! let page = fetcher.products(&query).await;
//! if tracker.is_current(ticket) {
//!     engine.set_products(page.data.content);
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Marks one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Hands out request tickets; clones share the same generation counter.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
  latest: Arc<AtomicU64>,
}

impl RequestTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Issue a ticket, superseding every earlier one.
  pub fn begin(&self) -> RequestTicket {
    RequestTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
  }

  /// Whether no newer ticket has been issued since `ticket`.
  pub fn is_current(&self, ticket: RequestTicket) -> bool {
    self.latest.load(Ordering::Acquire) == ticket.0
  }

  /// Supersede every outstanding ticket without issuing a new one.
  pub fn invalidate(&self) {
    self.latest.fetch_add(1, Ordering::AcqRel);
  }
}
