use catalog_sync::api::types::{AnalyticsReport, DateRange, ExportFormat, Product, SortOrder};
use catalog_sync::config::Config;
use catalog_sync::logging::{self, LogTarget};
use catalog_sync::{Catalog, DataLayer, Event, Topic};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long to wait for tracking requests before exiting
const TRACKING_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(about = "Browse and watch a product catalog and its live sales metrics")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/catalog-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Log to stderr instead of the log directory
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List products matching the given filters
  Products {
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    in_stock: bool,
    /// Sort field
    #[arg(long, default_value = "name")]
    sort: String,
    #[arg(long)]
    desc: bool,
    #[arg(short, long, default_value_t = 1)]
    page: u32,
  },
  /// List product categories
  Categories,
  /// Show one product and related items
  Product { id: u64 },
  /// Print live metrics and catalog refreshes until interrupted
  Watch,
  /// Summarise sales for the last N days
  Analytics {
    #[arg(short, long, default_value_t = 30)]
    days: i64,
    #[arg(long)]
    category: Option<String>,
    /// Keep reloading the report and printing live metrics until interrupted
    #[arg(short, long)]
    watch: bool,
  },
  /// Download an analytics export
  Export {
    #[arg(short, long, value_enum, default_value = "csv")]
    format: ExportFormat,
    #[arg(short, long, default_value_t = 30)]
    days: i64,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _guard = logging::init(&LogTarget::resolve(args.log_stderr)?)?;

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  let layer = DataLayer::new(&config)?;
  let result = run(&layer, args.command).await;
  layer.shutdown();
  result
}

async fn run(layer: &DataLayer, command: Command) -> Result<()> {
  match command {
    Command::Products {
      search,
      category,
      min_price,
      max_price,
      in_stock,
      sort,
      desc,
      page,
    } => {
      let catalog = layer.catalog();
      catalog.update_filters(|c| {
        c.search_term = search.unwrap_or_default();
        c.category = category.unwrap_or_default();
        if let Some(min) = min_price {
          c.price_range.min = min;
        }
        if let Some(max) = max_price {
          c.price_range.max = max;
        }
        c.in_stock = in_stock;
      });

      let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
      catalog.set_sort(&sort, order);
      catalog.set_page(page).await;
      wait_for_filters(layer, &catalog).await;

      let visible = catalog.engine().visible();
      for product in &visible {
        print_product_line(product);
      }
      println!(
        "\n{} shown of {} total, page {} of {}",
        visible.len(),
        catalog.total_items(),
        catalog.current_page(),
        catalog.total_pages().max(1)
      );
      catalog.teardown();
    }
    Command::Categories => {
      for category in layer.fetcher().categories().await {
        println!("{}", category);
      }
    }
    Command::Product { id } => {
      let product = layer
        .fetcher()
        .product(id)
        .await
        .ok_or_else(|| eyre!("Product {} not found", id))?;

      let catalog = layer.catalog();
      catalog.load_products().await;
      let tracking = catalog.view_product(&product);

      println!("{} (#{})", product.name, product.id);
      println!("  category: {}", product.category);
      println!("  price:    {:.2}", product.price);
      println!(
        "  stock:    {} ({})",
        product.stock_quantity,
        product.stock_badge().label()
      );
      if !product.description.is_empty() {
        println!("\n{}", product.description);
      }

      let related = catalog.related_products(&product);
      if !related.is_empty() {
        println!("\nRelated:");
        for p in &related {
          print_product_line(p);
        }
      }
      flush_tracking(tracking).await;
      catalog.teardown();
    }
    Command::Watch => watch(layer).await?,
    Command::Analytics {
      days,
      category,
      watch,
    } => analytics(layer, days, category, watch).await?,
    Command::Export {
      format,
      days,
      output,
    } => {
      let blob = layer
        .fetcher()
        .export(format, &DateRange::last_days(days))
        .await;
      if blob.is_empty() {
        return Err(eyre!("Export returned no data"));
      }
      match output {
        Some(path) => {
          std::fs::write(&path, &blob)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
          info!(path = %path.display(), bytes = blob.len(), "export written");
        }
        None => std::io::stdout().write_all(&blob)?,
      }
    }
  }
  Ok(())
}

async fn watch(layer: &DataLayer) -> Result<()> {
  let catalog = layer.catalog();
  let bus = layer.bus();

  bus.subscribe(Topic::MetricsUpdated, |event| {
    if let Event::MetricsUpdated(m) = event {
      println!(
        "[metrics] active users: {}  sales: {:.2}  top products: {}",
        m.active_users,
        m.current_sales,
        m.top_products.len()
      );
    }
  });
  bus.subscribe(Topic::ProductsLoaded, |event| {
    if let Event::ProductsLoaded { count, total } = event {
      println!("[catalog] {} products loaded ({} total)", count, total);
    }
  });
  bus.subscribe(Topic::ProductUpdated, |event| {
    if let Event::ProductUpdated(p) = event {
      println!("[stock]   {} now {}", p.name, p.stock_quantity);
    }
  });

  catalog.load_products().await;
  catalog.sync().start_metrics();
  if layer.config().sync.auto_refresh {
    catalog.start_auto_refresh();
  }

  tokio::signal::ctrl_c()
    .await
    .map_err(|e| eyre!("Failed to listen for ctrl-c: {}", e))?;
  catalog.teardown();
  Ok(())
}

async fn analytics(
  layer: &DataLayer,
  days: i64,
  category: Option<String>,
  watch: bool,
) -> Result<()> {
  let dashboard = layer.analytics();
  dashboard
    .set_filters(|f| {
      f.range = DateRange::last_days(days);
      f.category = category;
    })
    .await;
  print_report(&dashboard.report());

  if watch {
    let bus = layer.bus();
    bus.subscribe(Topic::AnalyticsUpdated, |event| {
      if let Event::AnalyticsUpdated(report) = event {
        println!(
          "[report]  revenue: {:.2}  orders: {}  conversion: {:.2}%",
          report.revenue, report.orders, report.conversion_rate
        );
      }
    });
    bus.subscribe(Topic::MetricsUpdated, |event| {
      if let Event::MetricsUpdated(m) = event {
        println!(
          "[metrics] active users: {}  sales: {:.2}",
          m.active_users, m.current_sales
        );
      }
    });

    dashboard.sync().start_metrics();
    dashboard.toggle_auto_refresh(layer.config().sync.auto_refresh);
    tokio::signal::ctrl_c()
      .await
      .map_err(|e| eyre!("Failed to listen for ctrl-c: {}", e))?;
  }
  dashboard.teardown();
  Ok(())
}

fn print_report(report: &AnalyticsReport) {
  println!("revenue:         {:.2}", report.revenue);
  println!("orders:          {}", report.orders);
  println!("conversion rate: {:.2}%", report.conversion_rate);
  if !report.sales.is_empty() {
    println!("\n{}", report.sales_csv());
  }
}

/// Give a spawned tracking request a moment to finish before the runtime
/// shuts down.
async fn flush_tracking(handle: JoinHandle<()>) {
  match tokio::time::timeout(TRACKING_GRACE, handle).await {
    Ok(Ok(())) => {}
    Ok(Err(e)) => warn!(error = %e, "tracking task failed"),
    Err(_) => warn!("tracking request still pending at exit"),
  }
}

/// Wait for the filter recomputation scheduled by the last load.
async fn wait_for_filters(layer: &DataLayer, catalog: &Catalog) {
  if !catalog.engine().is_filtering() {
    return;
  }
  let notify = Arc::new(Notify::new());
  let n = Arc::clone(&notify);
  let handle = layer.bus().subscribe(Topic::FiltersApplied, move |_| {
    n.notify_one();
  });
  if catalog.engine().is_filtering() {
    notify.notified().await;
  }
  layer.bus().unsubscribe(handle);
}

fn print_product_line(product: &Product) {
  println!(
    "{:>6}  {:<32} {:<16} {:>10.2}  {}",
    product.id,
    product.name,
    product.category,
    product.price,
    product.stock_badge().label()
  );
}
