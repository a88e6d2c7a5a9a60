//! Best-effort work decoupled from the response path.
//!
//! Cache writes and fire-and-forget enqueues run here. Handles are kept
//! only so callers can `settle()` before exiting or asserting.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
  handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run blocking store work on the blocking pool. Errors are logged, never surfaced.
  pub fn spawn_blocking<F>(&self, what: &'static str, work: F)
  where
    F: FnOnce() -> color_eyre::Result<()> + Send + 'static,
  {
    let handle = tokio::task::spawn_blocking(move || {
      if let Err(e) = work() {
        warn!(task = what, error = %e, "background task failed");
      }
    });
    self.track(handle);
  }

  fn track(&self, handle: JoinHandle<()>) {
    match self.handles.lock() {
      Ok(mut handles) => {
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
      }
      // Untracked tasks still run to completion
      Err(e) => warn!(error = %e, "background task list poisoned"),
    }
  }

  /// Wait for every task spawned so far.
  pub async fn settle(&self) {
    loop {
      let pending: Vec<JoinHandle<()>> = match self.handles.lock() {
        Ok(mut handles) => handles.drain(..).collect(),
        Err(_) => return,
      };
      if pending.is_empty() {
        return;
      }
      for handle in pending {
        if let Err(e) = handle.await {
          warn!(error = %e, "background task panicked");
        }
      }
    }
  }
}
