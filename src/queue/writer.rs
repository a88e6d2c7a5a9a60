//! Single writer for fire-and-forget enqueues.
//!
//! Callers hand records to one task over a channel; the task inserts them one
//! at a time, so queue ids follow call order.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::store::OfflineQueue;
use super::types::{QueueCategory, ReplayRequest};

enum Job {
  Enqueue(QueueCategory, ReplayRequest),
  /// Answered once every job sent before it has been written
  Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct QueueWriter {
  tx: mpsc::UnboundedSender<Job>,
}

impl QueueWriter {
  /// Spawn the writer task. Must be called inside a tokio runtime.
  pub fn spawn(queue: Arc<OfflineQueue>) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      while let Some(job) = rx.recv().await {
        match job {
          Job::Enqueue(category, payload) => {
            let queue = Arc::clone(&queue);
            let written =
              tokio::task::spawn_blocking(move || queue.enqueue(category, &payload)).await;
            match written {
              Ok(Ok(op)) => debug!(id = op.id, %category, path = %op.payload.path, "enqueued"),
              Ok(Err(e)) => warn!(%category, error = %e, "enqueue failed"),
              Err(e) => warn!(%category, error = %e, "enqueue task panicked"),
            }
          }
          Job::Flush(done) => {
            let _ = done.send(());
          }
        }
      }
    });

    Self { tx }
  }

  /// Queue a record for writing; returns immediately.
  pub fn enqueue(&self, category: QueueCategory, payload: ReplayRequest) {
    if self.tx.send(Job::Enqueue(category, payload)).is_err() {
      warn!(%category, "queue writer stopped, operation dropped");
    }
  }

  /// Wait until every record handed over so far is written.
  pub async fn flush(&self) {
    let (done, wait) = oneshot::channel();
    if self.tx.send(Job::Flush(done)).is_ok() {
      let _ = wait.await;
    }
  }
}
