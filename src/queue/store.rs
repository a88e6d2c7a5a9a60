//! Durable offline queue, one partition per category.
//!
//! Records live in the agent database so they survive restarts. Ids come from
//! SQLite AUTOINCREMENT and therefore grow monotonically and are never reused,
//! which gives insertion order within a category for free.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::Arc;

use super::types::{QueueCategory, QueuedOperation, ReplayRequest};
use crate::db::Database;

pub struct OfflineQueue {
  db: Arc<Database>,
}

impl OfflineQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Append an operation to its category's partition.
  pub fn enqueue(
    &self,
    category: QueueCategory,
    payload: &ReplayRequest,
  ) -> Result<QueuedOperation> {
    let conn = self.db.conn()?;
    let json =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
    let enqueued_at = Utc::now();

    conn
      .execute(
        "INSERT INTO queued_operations (category, payload, enqueued_at) VALUES (?, ?, ?)",
        params![category.as_str(), json, enqueued_at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to enqueue {} operation: {}", category, e))?;

    Ok(QueuedOperation {
      id: conn.last_insert_rowid(),
      category,
      payload: payload.clone(),
      enqueued_at,
    })
  }

  /// All records of a category in insertion order, without removing them.
  pub fn pending(&self, category: QueueCategory) -> Result<Vec<QueuedOperation>> {
    self.select(
      "SELECT id, category, payload, enqueued_at FROM queued_operations
       WHERE category = ? ORDER BY id",
      Some(category),
    )
  }

  /// Every record across categories, in id order.
  pub fn all(&self) -> Result<Vec<QueuedOperation>> {
    self.select(
      "SELECT id, category, payload, enqueued_at FROM queued_operations ORDER BY id",
      None,
    )
  }

  fn select(&self, sql: &str, category: Option<QueueCategory>) -> Result<Vec<QueuedOperation>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let map_row = |row: &rusqlite::Row<'_>| {
      Ok((
        row.get::<_, i64>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
      ))
    };
    let rows = match category {
      Some(c) => stmt.query_map(params![c.as_str()], map_row),
      None => stmt.query_map([], map_row),
    }
    .map_err(|e| eyre!("Failed to read queue: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read queued operation: {}", e))?;

    rows
      .into_iter()
      .map(|(id, category, payload, enqueued_at)| {
        Ok(QueuedOperation {
          id,
          category: category
            .parse()
            .map_err(|e: String| eyre!("Queued operation {}: {}", id, e))?,
          payload: serde_json::from_str(&payload)
            .map_err(|e| eyre!("Queued operation {} has a bad payload: {}", id, e))?,
          enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| eyre!("Queued operation {} has a bad timestamp: {}", id, e))?,
        })
      })
      .collect()
  }

  /// Remove a record after a confirmed replay. Returns false if it was already gone.
  pub fn remove(&self, id: i64) -> Result<bool> {
    let removed = self
      .db
      .conn()?
      .execute("DELETE FROM queued_operations WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queued operation {}: {}", id, e))?;
    Ok(removed > 0)
  }

  pub fn len(&self, category: QueueCategory) -> Result<usize> {
    let count: i64 = self
      .db
      .conn()?
      .query_row(
        "SELECT COUNT(*) FROM queued_operations WHERE category = ?",
        params![category.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count {} queue: {}", category, e))?;
    Ok(count as usize)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::Method;

  fn request(path: &str) -> ReplayRequest {
    ReplayRequest {
      method: Method::Post,
      path: path.to_string(),
      body: Some(r#"{"qty":1}"#.to_string()),
    }
  }

  #[test]
  fn test_ids_monotonic_across_categories() {
    let queue = OfflineQueue::new(Arc::new(Database::open_in_memory().unwrap()));
    let a = queue.enqueue(QueueCategory::Cart, &request("/api/cart/1")).unwrap();
    let b = queue.enqueue(QueueCategory::Order, &request("/api/orders")).unwrap();
    let c = queue.enqueue(QueueCategory::Cart, &request("/api/cart/2")).unwrap();
    assert!(a.id < b.id && b.id < c.id);

    let cart: Vec<_> = queue
      .pending(QueueCategory::Cart)
      .unwrap()
      .into_iter()
      .map(|op| op.payload.path)
      .collect();
    assert_eq!(cart, vec!["/api/cart/1", "/api/cart/2"]);
    assert_eq!(queue.len(QueueCategory::Order).unwrap(), 1);
    assert_eq!(queue.len(QueueCategory::Wishlist).unwrap(), 0);
  }

  #[test]
  fn test_ids_not_reused_after_remove() {
    let queue = OfflineQueue::new(Arc::new(Database::open_in_memory().unwrap()));
    let first = queue.enqueue(QueueCategory::Wishlist, &request("/api/wishlist")).unwrap();
    assert!(queue.remove(first.id).unwrap());
    assert!(!queue.remove(first.id).unwrap());

    let second = queue.enqueue(QueueCategory::Wishlist, &request("/api/wishlist")).unwrap();
    assert!(second.id > first.id);
  }

  #[test]
  fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.db");

    {
      let queue = OfflineQueue::new(Arc::new(Database::open(&path).unwrap()));
      queue.enqueue(QueueCategory::Cart, &request("/api/cart/1")).unwrap();
      queue.enqueue(QueueCategory::Cart, &request("/api/cart/2")).unwrap();
    }

    let queue = OfflineQueue::new(Arc::new(Database::open(&path).unwrap()));
    let pending = queue.pending(QueueCategory::Cart).unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].payload, request("/api/cart/1"));
    assert_eq!(queue.all().unwrap().len(), 2);
  }
}
