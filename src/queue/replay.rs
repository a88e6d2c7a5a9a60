//! Draining one category of the offline queue.

use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::store::OfflineQueue;
use super::types::{QueueCategory, QueuedOperation};
use crate::error::{AgentError, AgentResult};
use crate::net::{Request, Transport};

/// Outcome of one sync trigger for one category.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
  /// Operations confirmed by the upstream and removed from the queue
  pub replayed: Vec<QueuedOperation>,
  /// Operations that stay queued, with the reason
  pub failed: Vec<(QueuedOperation, String)>,
}

impl ReplayReport {
  pub fn attempted(&self) -> usize {
    self.replayed.len() + self.failed.len()
  }
}

/// Replay every queued operation of `category`, oldest first.
///
/// Each replay is awaited before the next starts. A failed replay leaves its
/// record in place and is not retried until the next trigger; later records
/// are still attempted.
pub async fn replay_category(
  queue: &OfflineQueue,
  transport: &dyn Transport,
  origin: &Url,
  fetch_timeout: Duration,
  category: QueueCategory,
) -> AgentResult<ReplayReport> {
  let pending = queue.pending(category)?;
  let mut report = ReplayReport::default();

  if pending.is_empty() {
    info!(%category, "sync trigger with empty queue");
    return Ok(report);
  }

  info!(%category, count = pending.len(), "replaying queued operations");

  for op in pending {
    match replay_one(transport, origin, fetch_timeout, &op).await {
      Ok(()) => {
        // Confirmed upstream; a failed remove only means it is sent again next trigger
        if let Err(e) = queue.remove(op.id) {
          warn!(id = op.id, %category, error = %e, "replayed but could not remove record");
        }
        info!(id = op.id, %category, path = %op.payload.path, "replayed queued operation");
        report.replayed.push(op);
      }
      Err(e) => {
        warn!(id = op.id, %category, error = %e, "replay failed, operation stays queued");
        report.failed.push((op, e.to_string()));
      }
    }
  }

  Ok(report)
}

async fn replay_one(
  transport: &dyn Transport,
  origin: &Url,
  fetch_timeout: Duration,
  op: &QueuedOperation,
) -> AgentResult<()> {
  let failure = |reason: String| AgentError::ReplayFailure { id: op.id, reason };

  let url = origin
    .join(&op.payload.path)
    .map_err(|e| failure(format!("invalid path {}: {}", op.payload.path, e)))?;
  let mut request = Request::new(
    op.payload.method,
    url,
    op.payload.body.as_ref().map(|b| b.as_bytes().to_vec()),
  );
  if op.payload.body.is_some() {
    request
      .headers
      .push(("content-type".to_string(), "application/json".to_string()));
  }

  let response = tokio::time::timeout(fetch_timeout, transport.send(request))
    .await
    .map_err(|_| failure(format!("timed out after {:?}", fetch_timeout)))?
    .map_err(|e| failure(e.to_string()))?;

  if response.is_success() {
    Ok(())
  } else {
    Err(failure(format!("upstream answered {}", response.status)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::net::mock::FakeTransport;
  use crate::net::{Method, Response};
  use crate::queue::ReplayRequest;
  use std::sync::Arc;

  fn origin() -> Url {
    Url::parse("http://shop.test").unwrap()
  }

  fn post(path: &str) -> ReplayRequest {
    ReplayRequest {
      method: Method::Post,
      path: path.to_string(),
      body: Some("{}".to_string()),
    }
  }

  fn queue() -> OfflineQueue {
    OfflineQueue::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn test_remove_failure_keeps_confirmed_replays_in_report() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let queue = OfflineQueue::new(db.clone());
    let transport = FakeTransport::new();
    for path in ["/api/cart/1", "/api/cart/2"] {
      transport.route(&format!("http://shop.test{}", path), Response::new(200, "{}"));
      queue.enqueue(QueueCategory::Cart, &post(path)).unwrap();
    }
    db.conn()
      .unwrap()
      .execute_batch(
        "CREATE TRIGGER no_delete BEFORE DELETE ON queued_operations
         BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
      )
      .unwrap();

    let report = replay_category(
      &queue,
      &transport,
      &origin(),
      Duration::from_secs(1),
      QueueCategory::Cart,
    )
    .await
    .unwrap();

    assert_eq!(report.replayed.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(queue.len(QueueCategory::Cart).unwrap(), 2);
  }

  #[tokio::test]
  async fn test_success_empties_category() {
    let queue = queue();
    let transport = FakeTransport::new();
    transport.route("http://shop.test/api/cart", Response::new(201, "{}"));
    queue.enqueue(QueueCategory::Cart, &post("/api/cart")).unwrap();
    queue.enqueue(QueueCategory::Order, &post("/api/orders")).unwrap();

    let report = replay_category(
      &queue,
      &transport,
      &origin(),
      Duration::from_secs(1),
      QueueCategory::Cart,
    )
    .await
    .unwrap();

    assert_eq!(report.replayed.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(queue.len(QueueCategory::Cart).unwrap(), 0);
    // other categories untouched
    assert_eq!(queue.len(QueueCategory::Order).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_failure_keeps_records() {
    let queue = queue();
    let transport = FakeTransport::new();
    transport.set_offline(true);
    queue.enqueue(QueueCategory::Wishlist, &post("/api/wishlist")).unwrap();

    let report = replay_category(
      &queue,
      &transport,
      &origin(),
      Duration::from_secs(1),
      QueueCategory::Wishlist,
    )
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(queue.len(QueueCategory::Wishlist).unwrap(), 1);
    // one attempt per record per trigger
    assert_eq!(transport.call_count(), 1);
  }

  #[tokio::test]
  async fn test_error_status_is_a_failure() {
    let queue = queue();
    let transport = FakeTransport::new();
    transport.route("http://shop.test/api/orders", Response::new(500, "boom"));
    queue.enqueue(QueueCategory::Order, &post("/api/orders")).unwrap();

    let report = replay_category(
      &queue,
      &transport,
      &origin(),
      Duration::from_secs(1),
      QueueCategory::Order,
    )
    .await
    .unwrap();

    assert!(report.failed[0].1.contains("500"));
    assert_eq!(queue.len(QueueCategory::Order).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_replays_in_enqueue_order() {
    let queue = queue();
    let transport = FakeTransport::new();
    for i in 1..=4 {
      let path = format!("/api/cart/{}", i);
      transport.route(&format!("http://shop.test{}", path), Response::new(200, "{}"));
      queue.enqueue(QueueCategory::Cart, &post(&path)).unwrap();
    }

    replay_category(
      &queue,
      &transport,
      &origin(),
      Duration::from_secs(1),
      QueueCategory::Cart,
    )
    .await
    .unwrap();

    let urls: Vec<String> = transport.calls().into_iter().map(|(_, url)| url).collect();
    assert_eq!(
      urls,
      vec![
        "http://shop.test/api/cart/1",
        "http://shop.test/api/cart/2",
        "http://shop.test/api/cart/3",
        "http://shop.test/api/cart/4",
      ]
    );
  }

  #[tokio::test]
  async fn test_hung_replay_times_out() {
    let queue = queue();
    let transport = FakeTransport::new();
    transport.hang("http://shop.test/api/cart");
    queue.enqueue(QueueCategory::Cart, &post("/api/cart")).unwrap();

    let report = replay_category(
      &queue,
      &transport,
      &origin(),
      Duration::from_millis(20),
      QueueCategory::Cart,
    )
    .await
    .unwrap();

    assert!(report.failed[0].1.contains("timed out"));
    assert_eq!(queue.len(QueueCategory::Cart).unwrap(), 1);
  }
}
