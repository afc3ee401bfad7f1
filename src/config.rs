use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::types::EventContext;
use crate::catalog::CatalogSettings;
use crate::filter::FilterTimings;
use crate::sync::SyncIntervals;

/// Overrides `api.base_url` when set.
pub const API_URL_ENV: &str = "CATALOG_SYNC_API_URL";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub filters: FiltersConfig,
  pub catalog: CatalogConfig,
  pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
  /// Server root, e.g. "https://shop.example.com"
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { ttl_secs: 300 }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
  pub metrics_interval_secs: u64,
  pub refresh_interval_secs: u64,
  /// Start the catalog refresh task when watching
  pub auto_refresh: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      metrics_interval_secs: 5,
      refresh_interval_secs: 30,
      auto_refresh: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FiltersConfig {
  pub search_debounce_ms: u64,
  pub throttle_ms: u64,
  pub apply_delay_ms: u64,
}

impl Default for FiltersConfig {
  fn default() -> Self {
    Self {
      search_debounce_ms: 300,
      throttle_ms: 100,
      apply_delay_ms: 100,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
  pub page_size: u32,
  pub items_per_page: u32,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      page_size: 100,
      items_per_page: 12,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
  /// Reported as the client in tracked events
  pub name: String,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      name: "catalog-sync".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./catalog-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/catalog-sync/config.yaml
  ///
  /// Without a file every setting takes its default. `CATALOG_SYNC_API_URL`
  /// is applied last.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api.base_url = url;
    }
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("catalog-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("catalog-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty document deserializes to unit, not an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache.ttl_secs)
  }

  pub fn sync_intervals(&self) -> SyncIntervals {
    SyncIntervals {
      metrics: Duration::from_secs(self.sync.metrics_interval_secs),
      refresh: Duration::from_secs(self.sync.refresh_interval_secs),
    }
  }

  pub fn filter_timings(&self) -> FilterTimings {
    FilterTimings {
      search_debounce: Duration::from_millis(self.filters.search_debounce_ms),
      throttle: Duration::from_millis(self.filters.throttle_ms),
      apply_delay: Duration::from_millis(self.filters.apply_delay_ms),
    }
  }

  pub fn catalog_settings(&self) -> CatalogSettings {
    CatalogSettings {
      page_size: self.catalog.page_size,
      items_per_page: self.catalog.items_per_page,
    }
  }

  pub fn event_context(&self) -> EventContext {
    EventContext {
      client: self.client.name.clone(),
      view: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_runtime_defaults() {
    let config = Config::default();
    assert_eq!(config.cache_ttl(), crate::cache::DEFAULT_TTL);
    assert_eq!(config.request_timeout(), crate::api::DEFAULT_TIMEOUT);
    assert_eq!(config.sync_intervals(), SyncIntervals::default());
    assert_eq!(config.filter_timings(), FilterTimings::default());
    assert_eq!(config.catalog_settings(), CatalogSettings::default());
    assert!(config.sync.auto_refresh);
  }

  #[test]
  fn test_partial_yaml_keeps_other_defaults() {
    let config = Config::from_yaml(
      r#"
api:
  base_url: https://shop.example.com
cache:
  ttl_secs: 60
filters:
  search_debounce_ms: 500
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://shop.example.com");
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    assert_eq!(
      config.filter_timings().search_debounce,
      Duration::from_millis(500)
    );
    assert_eq!(config.filter_timings().throttle, Duration::from_millis(100));
  }

  #[test]
  fn test_empty_document_is_default() {
    assert_eq!(Config::from_yaml("").unwrap(), Config::default());
  }

  #[test]
  fn test_malformed_yaml_is_error() {
    assert!(Config::from_yaml("cache: [1, 2").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/catalog-sync.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
