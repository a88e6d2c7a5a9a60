//! Install and activate: precaching and tier garbage collection.

use futures::future::try_join_all;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{CacheLayer, CacheStorage, CachedEntry, TierKind};
use crate::config::Config;
use crate::db::Database;
use crate::error::{AgentError, AgentResult};
use crate::net::{Request, Transport};

const ACTIVE_GENERATION_KEY: &str = "active_generation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
  pub generation: String,
  pub precached: usize,
  /// Take over immediately instead of waiting for existing consumers to close
  pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
  pub generation: String,
  /// Tiers deleted because they do not belong to the current generation
  pub purged: Vec<String>,
  /// Already-open pages are now served by this generation
  pub claimed: bool,
}

/// Fetch every manifest path and store them all in the static tier, or nothing.
///
/// Fetches run concurrently; the first failure aborts the install and the
/// tier is left untouched, so the previous generation stays authoritative.
pub async fn install<S: CacheStorage + 'static>(
  layer: &CacheLayer<S>,
  transport: &dyn Transport,
  config: &Config,
  fetch_timeout: Duration,
) -> AgentResult<InstallOutcome> {
  let generation = layer.registry().generation().to_string();
  info!(%generation, assets = config.precache.len(), "installing");

  let fetches = config.precache.iter().map(|path| async move {
    let failure = |reason: String| AgentError::InstallFailure {
      path: path.clone(),
      reason,
    };

    let url = config.resolve(path).map_err(|e| failure(e.to_string()))?;
    let request = Request::get(url);
    let response = tokio::time::timeout(fetch_timeout, transport.send(request.clone()))
      .await
      .map_err(|_| failure(format!("timed out after {:?}", fetch_timeout)))?
      .map_err(|e| failure(e.to_string()))?;

    CachedEntry::snapshot(&request, &response)
      .ok_or_else(|| failure(format!("upstream answered {}", response.status)))
  });

  let entries = match try_join_all(fetches).await {
    Ok(entries) => entries,
    Err(e) => {
      warn!(%generation, error = %e, "install aborted");
      return Err(e);
    }
  };

  let tier = layer.registry().name(TierKind::StaticAssets);
  layer
    .storage()
    .put_all(&tier, &entries)
    .map_err(|e| AgentError::InstallFailure {
      path: tier.clone(),
      reason: e.to_string(),
    })?;

  info!(%generation, %tier, precached = entries.len(), "installed");
  Ok(InstallOutcome {
    generation,
    precached: entries.len(),
    skip_waiting: true,
  })
}

/// Delete every tier outside the current generation's three, then claim consumers.
pub fn activate<S: CacheStorage + 'static>(
  layer: &CacheLayer<S>,
  db: &Database,
) -> AgentResult<ActivateOutcome> {
  let registry = layer.registry();
  let mut purged = Vec::new();

  for tier in layer.storage().tier_names()? {
    if registry.is_current(&tier) {
      continue;
    }
    if layer.storage().delete_tier(&tier)? {
      info!(%tier, "purged stale tier");
      purged.push(tier);
    }
  }

  db.set_meta(ACTIVE_GENERATION_KEY, registry.generation())?;
  info!(generation = registry.generation(), purged = purged.len(), "activated, claiming clients");

  Ok(ActivateOutcome {
    generation: registry.generation().to_string(),
    purged,
    claimed: true,
  })
}

/// Generation recorded by the last successful activate, if any.
pub fn active_generation(db: &Database) -> AgentResult<Option<String>> {
  Ok(db.get_meta(ACTIVE_GENERATION_KEY)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::background::BackgroundTasks;
  use crate::cache::{CacheTierRegistry, SqliteStorage};
  use crate::net::mock::FakeTransport;
  use crate::net::Response;
  use std::sync::Arc;

  fn setup(generation: &str, db: Arc<Database>) -> (CacheLayer<SqliteStorage>, Config) {
    let config = Config {
      generation: generation.to_string(),
      precache: vec!["/".to_string(), "/offline.html".to_string()],
      ..Config::default()
    };
    let storage = Arc::new(SqliteStorage::new(db));
    let layer = CacheLayer::new(
      storage,
      CacheTierRegistry::new(generation),
      BackgroundTasks::new(),
    );
    (layer, config)
  }

  fn seed(layer: &CacheLayer<SqliteStorage>, tier: &str) {
    let request = Request::get(url::Url::parse("http://localhost:3000/seed").unwrap());
    let entry = CachedEntry::snapshot(&request, &Response::html(200, "seed")).unwrap();
    layer.storage().put(tier, &entry).unwrap();
  }

  fn transport() -> FakeTransport {
    let transport = FakeTransport::new();
    transport.route("http://localhost:3000/", Response::html(200, "<h1>home</h1>"));
    transport.route(
      "http://localhost:3000/offline.html",
      Response::html(200, "<h1>offline</h1>"),
    );
    transport
  }

  #[tokio::test]
  async fn test_install_then_activate_precaches_manifest() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (layer, config) = setup("v1", db.clone());

    let installed = install(&layer, &transport(), &config, Duration::from_secs(1))
      .await
      .unwrap();
    assert_eq!(installed.precached, 2);
    assert!(installed.skip_waiting);

    let activated = activate(&layer, &db).unwrap();
    assert!(activated.claimed);
    assert!(activated.purged.is_empty());
    assert_eq!(
      layer.storage().entry_count("static-assets-v1").unwrap(),
      2
    );
    assert_eq!(active_generation(&db).unwrap().as_deref(), Some("v1"));
  }

  #[tokio::test]
  async fn test_install_failure_writes_nothing() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (layer, config) = setup("v1", db.clone());
    let transport = transport();
    transport.fail("http://localhost:3000/offline.html");

    let err = install(&layer, &transport, &config, Duration::from_secs(1))
      .await
      .unwrap_err();
    assert!(matches!(err, AgentError::InstallFailure { ref path, .. } if path == "/offline.html"));
    assert!(layer.storage().tier_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_rejects_error_status() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (layer, mut config) = setup("v1", db);
    config.precache.push("/missing.css".to_string());

    let err = install(&layer, &transport(), &config, Duration::from_secs(1))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("404"));
    assert_eq!(layer.storage().entry_count("static-assets-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_failed_upgrade_keeps_previous_generation() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (v1, config) = setup("v1", db.clone());
    install(&v1, &transport(), &config, Duration::from_secs(1))
      .await
      .unwrap();
    activate(&v1, &db).unwrap();

    let (v2, config) = setup("v2", db.clone());
    let offline = transport();
    offline.set_offline(true);
    assert!(install(&v2, &offline, &config, Duration::from_secs(1))
      .await
      .is_err());

    assert_eq!(v1.storage().entry_count("static-assets-v1").unwrap(), 2);
    assert_eq!(active_generation(&db).unwrap().as_deref(), Some("v1"));
  }

  #[tokio::test]
  async fn test_activate_purges_other_generations() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (v1, config) = setup("v1", db.clone());
    install(&v1, &transport(), &config, Duration::from_secs(1))
      .await
      .unwrap();
    seed(&v1, "dynamic-pages-v1");
    seed(&v1, "legacy-cache");

    let (v2, config) = setup("v2", db.clone());
    install(&v2, &transport(), &config, Duration::from_secs(1))
      .await
      .unwrap();
    seed(&v2, "api-responses-v2");

    let activated = activate(&v2, &db).unwrap();
    assert_eq!(
      activated.purged,
      vec!["dynamic-pages-v1", "legacy-cache", "static-assets-v1"]
    );

    for tier in v2.storage().tier_names().unwrap() {
      assert!(v2.registry().is_current(&tier), "stale tier {} survived", tier);
    }
    assert_eq!(v2.storage().entry_count("static-assets-v2").unwrap(), 2);
  }
}
