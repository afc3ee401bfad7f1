//! Scripted in-memory transport for tests.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::error::FetchError;
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::lock;

/// What the fake answers for a path.
#[derive(Debug, Clone)]
pub enum Reply {
  Json(Value),
  /// JSON body delivered after a delay
  Delayed(Duration, Value),
  Bytes(Vec<u8>),
  Status(u16),
  Fail,
  /// Never completes
  Hang,
}

/// Answers each path from a queue of replies; the last reply repeats.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<String, VecDeque<Reply>>>,
  requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace every queued reply for `path` with `reply`.
  pub fn respond(&self, path: &str, reply: Reply) {
    lock(&self.routes).insert(path.to_string(), VecDeque::from([reply]));
  }

  /// Queue `reply` after the replies already scripted for `path`.
  pub fn enqueue(&self, path: &str, reply: Reply) {
    lock(&self.routes)
      .entry(path.to_string())
      .or_default()
      .push_back(reply);
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    lock(&self.requests).clone()
  }

  pub fn calls_to(&self, path: &str) -> usize {
    lock(&self.requests)
      .iter()
      .filter(|r| r.path == path)
      .count()
  }

  fn next_reply(&self, path: &str) -> Reply {
    let mut routes = lock(&self.routes);
    match routes.get_mut(path) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Status(404)),
      Some(queue) => queue.front().cloned().unwrap_or(Reply::Status(404)),
      None => Reply::Status(404),
    }
  }
}

fn json_response(value: &Value) -> ApiResponse {
  ApiResponse {
    status: 200,
    body: serde_json::to_vec(value).unwrap_or_default(),
  }
}

impl Transport for FakeTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, FetchError>> {
    let reply = self.next_reply(&request.path);
    lock(&self.requests).push(request);

    Box::pin(async move {
      match reply {
        Reply::Json(value) => Ok(json_response(&value)),
        Reply::Delayed(delay, value) => {
          tokio::time::sleep(delay).await;
          Ok(json_response(&value))
        }
        Reply::Bytes(body) => Ok(ApiResponse {
          status: 200,
          body,
        }),
        Reply::Status(status) => Ok(ApiResponse {
          status,
          body: Vec::new(),
        }),
        Reply::Fail => Err(FetchError::Network("connection refused".to_string())),
        Reply::Hang => futures::future::pending().await,
      }
    })
  }
}
