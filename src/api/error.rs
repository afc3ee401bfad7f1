use std::time::Duration;
use thiserror::Error;

/// Why a request produced no usable payload.
///
/// Every variant is folded into the same fail-soft outcome by
/// [`super::DataFetcher`]; the distinction only reaches the logs.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  #[error("network error: {0}")]
  Network(String),

  #[error("server responded with status {0}")]
  Status(u16),

  #[error("malformed response: {0}")]
  Decode(String),

  #[error("invalid request url: {0}")]
  InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    FetchError::Network(e.to_string())
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(e: serde_json::Error) -> Self {
    FetchError::Decode(e.to_string())
  }
}

impl From<url::ParseError> for FetchError {
  fn from(e: url::ParseError) -> Self {
    FetchError::InvalidUrl(e.to_string())
  }
}
