//! Tracing subscriber setup for the command-line tool.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "CATALOG_SYNC_LOG";
const DEFAULT_LEVEL: &str = "info";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
  Stderr,
  /// Daily-rotated files in the given directory
  File(PathBuf),
}

impl LogTarget {
  /// `stderr` if requested, else the per-user data directory.
  pub fn resolve(stderr: bool) -> Result<Self> {
    if stderr {
      return Ok(LogTarget::Stderr);
    }
    Ok(LogTarget::File(log_dir()?))
  }
}

/// `~/.local/share/catalog-sync/logs` or the platform equivalent.
pub fn log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;
  Ok(data_dir.join("catalog-sync").join("logs"))
}

/// Build the filter from `CATALOG_SYNC_LOG`, defaulting to `info`.
pub fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered file output when dropped; keep it
/// alive until the program exits.
pub fn init(target: &LogTarget) -> Result<Option<WorkerGuard>> {
  let registry = tracing_subscriber::registry().with(env_filter());

  match target {
    LogTarget::Stderr => {
      registry
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(None)
    }
    LogTarget::File(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let (writer, guard) = non_blocking(rolling::daily(dir, "catalog-sync.log"));
      registry
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(Some(guard))
    }
  }
}
