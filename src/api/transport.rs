//! Request/response plumbing and the HTTP transport.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::error::FetchError;
use crate::cache::QueryParams;

pub use reqwest::Method;

/// An API call relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub params: QueryParams,
  pub body: Option<Value>,
  /// Overrides the fetcher's default timeout
  pub timeout: Option<Duration>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      path: path.into(),
      params: QueryParams::new(),
      body: None,
      timeout: None,
    }
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::POST,
      body: Some(body),
      ..Self::get(path)
    }
  }

  pub fn with_params(mut self, params: QueryParams) -> Self {
    self.params = params;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

/// Raw response as received from the transport.
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl ApiResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
    Ok(serde_json::from_slice(&self.body)?)
  }
}

/// Sends [`ApiRequest`]s. Implemented over HTTP by [`HttpTransport`].
pub trait Transport: Send + Sync {
  fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, FetchError>>;
}

/// reqwest-backed transport rooted at a base URL.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  /// Request paths resolve below `base_url`, including any path prefix it
  /// carries.
  pub fn new(base_url: &str) -> Result<Self, FetchError> {
    let mut base_url = Url::parse(base_url)?;
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }
    let client = reqwest::Client::builder()
      .gzip(true)
      .build()
      .map_err(FetchError::from)?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn url_for(&self, path: &str) -> Result<Url, FetchError> {
    Ok(self.base_url.join(path.trim_start_matches('/'))?)
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, FetchError>> {
    Box::pin(async move {
      let url = self.url_for(&request.path)?;

      let mut builder = self.client.request(request.method, url);
      if !request.params.is_empty() {
        builder = builder.query(&request.params.pairs());
      }
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      let response = builder.send().await?;
      let status = response.status().as_u16();
      let body = response.bytes().await?.to_vec();

      Ok(ApiResponse { status, body })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(matches!(
      HttpTransport::new("not a url"),
      Err(FetchError::InvalidUrl(_))
    ));
  }

  #[test]
  fn test_response_status_classification() {
    let ok = ApiResponse {
      status: 204,
      body: Vec::new(),
    };
    let missing = ApiResponse { status: 404, ..ok.clone() };
    assert!(ok.is_success());
    assert!(!missing.is_success());
  }

  #[test]
  fn test_paths_resolve_below_base_path() {
    let transport = HttpTransport::new("https://host.example/shop").unwrap();
    assert_eq!(
      transport.url_for("/api/v1/products").unwrap().as_str(),
      "https://host.example/shop/api/v1/products"
    );

    let rooted = HttpTransport::new("http://localhost:8080").unwrap();
    assert_eq!(
      rooted.url_for("/api/v1/products").unwrap().as_str(),
      "http://localhost:8080/api/v1/products"
    );
  }
}
