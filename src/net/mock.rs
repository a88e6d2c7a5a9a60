//! Scripted transport for tests.

use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::client::Transport;
use super::types::{Method, Request, Response};
use crate::error::{AgentError, AgentResult};

#[derive(Default)]
struct State {
  routes: HashMap<String, Response>,
  offline: bool,
  failing: HashSet<String>,
  hanging: HashSet<String>,
  calls: Vec<(Method, String)>,
}

/// Answers from a fixed route table keyed by absolute URL.
///
/// Unknown URLs answer 404. URLs marked failing (or every URL while offline)
/// fail with `NetworkUnavailable`; hanging URLs never resolve.
#[derive(Clone, Default)]
pub struct FakeTransport {
  state: Arc<Mutex<State>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self
      .state
      .lock()
      .unwrap()
      .routes
      .insert(url.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.state.lock().unwrap().offline = offline;
  }

  pub fn fail(&self, url: &str) {
    self.state.lock().unwrap().failing.insert(url.to_string());
  }

  pub fn hang(&self, url: &str) {
    self.state.lock().unwrap().hanging.insert(url.to_string());
  }

  pub fn calls(&self) -> Vec<(Method, String)> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn call_count(&self) -> usize {
    self.state.lock().unwrap().calls.len()
  }
}

impl Transport for FakeTransport {
  fn send(&self, request: Request) -> BoxFuture<'static, AgentResult<Response>> {
    let url = request.url.to_string();
    let outcome = {
      let mut state = self.state.lock().unwrap();
      state.calls.push((request.method, url.clone()));
      if state.hanging.contains(&url) {
        None
      } else if state.offline || state.failing.contains(&url) {
        Some(Err(AgentError::NetworkUnavailable(url.clone())))
      } else {
        Some(Ok(
          state
            .routes
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")),
        ))
      }
    };

    async move {
      match outcome {
        Some(result) => result,
        None => futures::future::pending().await,
      }
    }
    .boxed()
  }
}
