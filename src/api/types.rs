//! Serde types matching the catalog and analytics API.
//!
//! Wire names are camelCase. Every listing or aggregate type has a `Default`
//! that doubles as the fallback value when a request fails.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::QueryParams;

/// Stock level below which a product counts as low stock.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

// ============================================================================
// Catalog
// ============================================================================

/// A catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  pub price: f64,
  #[serde(default)]
  pub stock_quantity: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(default = "default_active")]
  pub active: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rating: Option<f64>,
}

fn default_active() -> bool {
  true
}

impl Product {
  pub fn stock_badge(&self) -> StockBadge {
    StockBadge::for_quantity(self.stock_quantity)
  }
}

/// Display classification of a stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockBadge {
  OutOfStock,
  LowStock,
  InStock,
}

impl StockBadge {
  pub fn for_quantity(quantity: i64) -> Self {
    if quantity <= 0 {
      StockBadge::OutOfStock
    } else if quantity < LOW_STOCK_THRESHOLD {
      StockBadge::LowStock
    } else {
      StockBadge::InStock
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      StockBadge::OutOfStock => "Out of Stock",
      StockBadge::LowStock => "Low Stock",
      StockBadge::InStock => "In Stock",
    }
  }
}

/// Paginated listing envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  #[serde(default = "Vec::new")]
  pub content: Vec<T>,
  #[serde(default)]
  pub total_elements: u64,
}

impl<T> Default for Page<T> {
  fn default() -> Self {
    Self {
      content: Vec::new(),
      total_elements: 0,
    }
  }
}

/// Server push: a single product's stock level changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
  #[serde(alias = "productId")]
  pub id: u64,
  pub new_stock: i64,
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortOrder::Asc => "asc",
      SortOrder::Desc => "desc",
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      SortOrder::Asc => SortOrder::Desc,
      SortOrder::Desc => SortOrder::Asc,
    }
  }
}

/// Parameters of a product listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuery {
  /// Zero-based page index
  pub page: u32,
  pub size: u32,
  pub sort_by: String,
  pub sort_order: SortOrder,
  pub search: Option<String>,
  pub min_price: Option<f64>,
  pub max_price: Option<f64>,
  pub in_stock: bool,
}

impl Default for ProductQuery {
  fn default() -> Self {
    Self {
      page: 0,
      size: 100,
      sort_by: "name".to_string(),
      sort_order: SortOrder::Asc,
      search: None,
      min_price: None,
      max_price: None,
      in_stock: false,
    }
  }
}

impl ProductQuery {
  /// Query string parameters; unset filters are omitted.
  pub fn params(&self) -> QueryParams {
    let mut params = QueryParams::new();
    params
      .insert("page", self.page)
      .insert("size", self.size)
      .insert("sort", format!("{},{}", self.sort_by, self.sort_order.as_str()))
      .insert_opt("search", self.search.as_deref())
      .insert_opt("minPrice", self.min_price)
      .insert_opt("maxPrice", self.max_price);
    if self.in_stock {
      params.insert("inStock", true);
    }
    params
  }
}

// ============================================================================
// Analytics
// ============================================================================

/// Live dashboard counters, replaced wholesale on every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
  #[serde(default)]
  pub active_users: u64,
  #[serde(default)]
  pub current_sales: f64,
  #[serde(default)]
  pub top_products: Vec<Value>,
  #[serde(default)]
  pub recent_orders: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesPoint {
  pub date: String,
  #[serde(default)]
  pub amount: f64,
  #[serde(default)]
  pub revenue: f64,
  #[serde(default)]
  pub customers: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSales {
  pub name: String,
  #[serde(default)]
  pub sales: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerPoint {
  pub date: String,
  #[serde(default)]
  pub count: u64,
}

/// Aggregate analytics for a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
  #[serde(default)]
  pub sales: Vec<SalesPoint>,
  #[serde(default)]
  pub products: Vec<ProductSales>,
  #[serde(default)]
  pub customers: Vec<CustomerPoint>,
  #[serde(default)]
  pub revenue: f64,
  #[serde(default)]
  pub orders: u64,
  #[serde(default)]
  pub conversion_rate: f64,
}

impl AnalyticsReport {
  /// Render the sales series as CSV.
  pub fn sales_csv(&self) -> String {
    let mut csv = String::from("Date,Sales,Revenue,Customers\n");
    for point in &self.sales {
      csv.push_str(&format!(
        "{},{},{},{}\n",
        point.date, point.amount, point.revenue, point.customers
      ));
    }
    csv
  }
}

/// Inclusive date range for analytics requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

impl DateRange {
  /// The `days` days leading up to now.
  pub fn last_days(days: i64) -> Self {
    let end = Utc::now();
    Self {
      start: end - Duration::days(days),
      end,
    }
  }
}

/// Filters for the analytics aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsQuery {
  pub range: DateRange,
  pub category: Option<String>,
  pub product: Option<String>,
}

impl Default for AnalyticsQuery {
  fn default() -> Self {
    Self {
      range: DateRange::last_days(30),
      category: None,
      product: None,
    }
  }
}

impl AnalyticsQuery {
  pub fn params(&self) -> QueryParams {
    let mut params = QueryParams::new();
    params
      .insert("startDate", self.range.start.to_rfc3339())
      .insert("endDate", self.range.end.to_rfc3339())
      .insert_opt("category", self.category.as_deref())
      .insert_opt("product", self.product.as_deref());
    params
  }
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
  Csv,
  Pdf,
}

impl ExportFormat {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExportFormat::Csv => "csv",
      ExportFormat::Pdf => "pdf",
    }
  }
}

/// Where a tracked event originated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
  pub client: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub view: Option<String>,
}

/// Body of an analytics tracking POST.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedEvent {
  pub event: String,
  pub data: Value,
  pub timestamp: DateTime<Utc>,
  pub context: EventContext,
}
