//! Core traits and types for the tiered response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::net::{Request, Response};
use crate::queue::SyncTag;

/// A stored GET response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
  /// Method plus absolute URL
  pub request_key: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub inserted_at: DateTime<Utc>,
}

impl CachedEntry {
  /// Snapshot a response for the given request.
  ///
  /// Returns None when the pair is not eligible: only successful GETs are cached.
  pub fn snapshot(request: &Request, response: &Response) -> Option<Self> {
    if request.method != crate::net::Method::Get || !response.is_success() {
      return None;
    }
    Some(Self {
      request_key: request.cache_key(),
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
      inserted_at: Utc::now(),
    })
  }

  pub fn to_response(&self) -> Response {
    Response {
      status: self.status,
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }
}

/// Trait for tier storage backends.
///
/// Writes are last-writer-wins per key; there is no locking beyond what a
/// single call needs.
pub trait CacheStorage: Send + Sync {
  /// Names of every tier currently stored, of any generation.
  fn tier_names(&self) -> Result<Vec<String>>;

  /// Delete a tier and all of its entries. Returns false if it did not exist.
  fn delete_tier(&self, tier: &str) -> Result<bool>;

  fn get(&self, tier: &str, request_key: &str) -> Result<Option<CachedEntry>>;

  /// Store one entry, opening the tier if needed.
  fn put(&self, tier: &str, entry: &CachedEntry) -> Result<()>;

  /// Store all entries or none of them.
  fn put_all(&self, tier: &str, entries: &[CachedEntry]) -> Result<()>;

  fn entry_count(&self, tier: &str) -> Result<usize>;
}

/// A response handed back to the foreground app, with metadata about where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: CacheSource,
  /// When the entry was cached (if from a tier)
  pub cached_at: Option<DateTime<Utc>>,
  /// Background sync the host should register, set when a mutation was queued
  pub sync_tag: Option<SyncTag>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
      sync_tag: None,
    }
  }

  pub fn from_cache(entry: CachedEntry) -> Self {
    Self {
      response: entry.to_response(),
      source: CacheSource::Cache,
      cached_at: Some(entry.inserted_at),
      sync_tag: None,
    }
  }

  pub fn offline(entry: CachedEntry) -> Self {
    Self {
      response: entry.to_response(),
      source: CacheSource::Offline,
      cached_at: Some(entry.inserted_at),
      sync_tag: None,
    }
  }

  pub fn offline_page(entry: CachedEntry) -> Self {
    Self {
      source: CacheSource::OfflinePage,
      ..Self::offline(entry)
    }
  }

  pub fn synthesized(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Synthesized,
      cached_at: None,
      sync_tag: None,
    }
  }

  pub fn queued(response: Response, tag: SyncTag) -> Self {
    Self {
      response,
      source: CacheSource::Queued,
      cached_at: None,
      sync_tag: Some(tag),
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Live response from the network
  Network,
  /// Tier hit, network not consulted
  Cache,
  /// Network unavailable, serving the tier's copy for the same key
  Offline,
  /// Network unavailable and nothing cached, serving the offline fallback page
  OfflinePage,
  /// Network unavailable and nothing cached, answer built by the agent
  Synthesized,
  /// Mutation could not reach the network and was queued for replay
  Queued,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
      CacheSource::Offline => "offline",
      CacheSource::OfflinePage => "offline-page",
      CacheSource::Synthesized => "synthesized",
      CacheSource::Queued => "queued",
    };
    f.write_str(name)
  }
}
