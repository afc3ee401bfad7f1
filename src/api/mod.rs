//! HTTP access to the catalog and analytics API.

mod error;
mod fetcher;
mod keys;
mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use error::FetchError;
pub use fetcher::{DataFetcher, DEFAULT_TIMEOUT};
pub use keys::CatalogQueryKey;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
pub use types::{
  AnalyticsQuery, AnalyticsReport, DateRange, EventContext, ExportFormat, MetricsSnapshot, Page,
  Product, ProductQuery, SortOrder, StockBadge, StockChange,
};
