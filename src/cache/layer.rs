//! Cache layer that applies a caching strategy around a network fetch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::registry::{CacheTierRegistry, TierKind};
use super::traits::{CacheStorage, CachedEntry, Served};
use crate::background::BackgroundTasks;
use crate::classify::Category;
use crate::error::{AgentError, AgentResult};
use crate::net::{Request, Response};

/// What network-first serves when both the network and the tier come up empty.
#[derive(Debug, Clone)]
pub enum Fallback {
  /// Synthesize a structured JSON offline error
  OfflineError,
  /// Serve this precached page from the static tier
  OfflinePage { request_key: String },
}

/// Cache layer that owns the tiers and runs Cache-First / Network-First.
///
/// Cache writes are handed to `BackgroundTasks` and never delay the
/// response they were taken from.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  registry: CacheTierRegistry,
  background: BackgroundTasks,
  /// Upper bound on a live fetch before falling back
  fetch_timeout: Duration,
}

impl<S: CacheStorage + 'static> CacheLayer<S> {
  pub fn new(storage: Arc<S>, registry: CacheTierRegistry, background: BackgroundTasks) -> Self {
    Self {
      storage,
      registry,
      background,
      fetch_timeout: Duration::from_secs(10),
    }
  }

  pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
    self.fetch_timeout = fetch_timeout;
    self
  }

  pub fn registry(&self) -> &CacheTierRegistry {
    &self.registry
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Read an entry from a tier of the current generation. Store errors count as a miss.
  pub fn lookup(&self, kind: TierKind, request_key: &str) -> Option<CachedEntry> {
    let tier = self.registry.name(kind);
    match self.storage.get(&tier, request_key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(%tier, key = request_key, error = %e, "tier read failed, treating as miss");
        None
      }
    }
  }

  /// Start a best-effort write; returns immediately.
  pub fn store_in_background(&self, kind: TierKind, entry: CachedEntry) {
    let storage = Arc::clone(&self.storage);
    let tier = self.registry.name(kind);
    self.background.spawn_blocking("cache write", move || {
      debug!(%tier, key = %entry.request_key, "storing snapshot");
      storage.put(&tier, &entry)
    });
  }

  async fn timed<Fut>(&self, fetch: Fut) -> AgentResult<Response>
  where
    Fut: Future<Output = AgentResult<Response>>,
  {
    match tokio::time::timeout(self.fetch_timeout, fetch).await {
      Ok(result) => result,
      Err(_) => Err(AgentError::NetworkUnavailable(format!(
        "no response within {:?}",
        self.fetch_timeout
      ))),
    }
  }

  /// Cache-First.
  ///
  /// 1. Tier hit - return it, the network is not touched
  /// 2. Miss - fetch; on success start a tier write and return the response
  /// 3. Fetch failure - propagate, no further fallback
  pub async fn cache_first<F, Fut>(
    &self,
    request: &Request,
    category: Category,
    fetcher: F,
  ) -> AgentResult<Served>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AgentResult<Response>>,
  {
    let kind = TierKind::for_category(category);
    let key = request.cache_key();

    if let Some(entry) = self.lookup(kind, &key) {
      debug!(%key, "cache hit");
      return Ok(Served::from_cache(entry));
    }

    debug!(%key, "cache miss, fetching");
    let response = self.timed(fetcher()).await?;
    if let Some(entry) = CachedEntry::snapshot(request, &response) {
      self.store_in_background(kind, entry);
    }
    Ok(Served::from_network(response))
  }

  /// Network-First with fallback.
  ///
  /// 1. Live fetch - return it; if `cacheable` and successful, snapshot it in the background
  /// 2. Fetch failure - serve the tier's entry for the same key
  /// 3. Nothing cached - serve `fallback`
  pub async fn network_first<F, Fut>(
    &self,
    request: &Request,
    category: Category,
    cacheable: bool,
    fallback: Fallback,
    fetcher: F,
  ) -> Served
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AgentResult<Response>>,
  {
    let kind = TierKind::for_category(category);
    let key = request.cache_key();

    let error = match self.timed(fetcher()).await {
      Ok(response) => {
        if cacheable {
          if let Some(entry) = CachedEntry::snapshot(request, &response) {
            self.store_in_background(kind, entry);
          }
        }
        return Served::from_network(response);
      }
      Err(e) => e,
    };

    debug!(%key, error = %error, "network failed, trying tier");
    if let Some(entry) = self.lookup(kind, &key) {
      return Served::offline(entry);
    }

    let miss = AgentError::CacheMiss(key);
    debug!(error = %miss, "serving fallback");
    match fallback {
      Fallback::OfflineError => Served::synthesized(offline_api_response()),
      Fallback::OfflinePage { request_key } => {
        match self.lookup(TierKind::StaticAssets, &request_key) {
          Some(entry) => Served::offline_page(entry),
          None => Served::synthesized(offline_page_response()),
        }
      }
    }
  }
}

/// Structured error for API calls that cannot be answered offline.
pub fn offline_api_response() -> Response {
  Response::json(
    503,
    &serde_json::json!({
      "error": "offline",
      "message": "You are offline and this data is not available in the cache.",
    }),
  )
}

/// Minimal page used when even the precached offline page is missing.
pub fn offline_page_response() -> Response {
  Response::html(
    503,
    "<!doctype html><html><head><title>Offline</title></head>\
     <body><h1>You are offline</h1><p>Check your connection and try again.</p></body></html>",
  )
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      registry: self.registry.clone(),
      background: self.background.clone(),
      fetch_timeout: self.fetch_timeout,
    }
  }
}
