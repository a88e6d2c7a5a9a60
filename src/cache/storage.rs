//! SQLite implementation of the tier store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::traits::{CacheStorage, CachedEntry};
use crate::db::Database;

/// SQLite-based tier storage.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

/// SHA256 of the request key, for stable fixed-length row keys.
fn key_hash(request_key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request_key.as_bytes());
  hex::encode(hasher.finalize())
}

fn open_tier_in(conn: &Connection, tier: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_tiers (name) VALUES (?)",
      params![tier],
    )
    .map_err(|e| eyre!("Failed to open tier {}: {}", tier, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, tier: &str, entry: &CachedEntry) -> Result<()> {
  let headers =
    serde_json::to_string(&entry.headers).map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (tier, key_hash, request_key, status, headers, body, inserted_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        tier,
        key_hash(&entry.request_key),
        entry.request_key,
        entry.status,
        headers,
        entry.body,
        entry.inserted_at.to_rfc3339(),
      ],
    )
    .map_err(|e| eyre!("Failed to store entry {}: {}", entry.request_key, e))?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn tier_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_tiers ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list tiers: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read tier name: {}", e))?;

    Ok(names)
  }

  fn delete_tier(&self, tier: &str) -> Result<bool> {
    let conn = self.db.conn()?;
    // Entries go with the tier via ON DELETE CASCADE
    let deleted = conn
      .execute("DELETE FROM cache_tiers WHERE name = ?", params![tier])
      .map_err(|e| eyre!("Failed to delete tier {}: {}", tier, e))?;
    Ok(deleted > 0)
  }

  fn get(&self, tier: &str, request_key: &str) -> Result<Option<CachedEntry>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, inserted_at FROM cache_entries
         WHERE tier = ? AND key_hash = ?",
        params![tier, key_hash(request_key)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read entry {}: {}", request_key, e))?;

    match row {
      Some((status, headers, body, inserted_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(CachedEntry {
          request_key: request_key.to_string(),
          status,
          headers,
          body,
          inserted_at: parse_datetime(&inserted_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, tier: &str, entry: &CachedEntry) -> Result<()> {
    let conn = self.db.conn()?;
    open_tier_in(&conn, tier)?;
    insert_entry(&conn, tier, entry)
  }

  fn put_all(&self, tier: &str, entries: &[CachedEntry]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    open_tier_in(&tx, tier)?;
    for entry in entries {
      // Dropping the transaction on error rolls everything back
      insert_entry(&tx, tier, entry)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn entry_count(&self, tier: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE tier = ?",
        params![tier],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries in {}: {}", tier, e))?;
    Ok(count as usize)
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
