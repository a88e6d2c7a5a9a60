use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::queue::QueueCategory;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the foreground app is served from; manifest and replay paths resolve against it
  pub origin: String,
  /// Deployment generation suffix for every cache tier (e.g. "v3")
  pub generation: String,
  /// Critical asset paths stored in the static tier on install
  pub precache: Vec<String>,
  pub api_prefix: String,
  /// File extensions (without dot) classified as static assets
  #[serde(deserialize_with = "deserialize_lowercase_vec")]
  pub static_extensions: Vec<String>,
  /// Path prefixes classified as static assets regardless of extension
  pub static_prefixes: Vec<String>,
  /// Regular expressions over the URL path of API responses that may be cached
  pub cacheable_api: Vec<String>,
  /// Page served for navigations when neither network nor cache can answer
  pub offline_page: String,
  /// Path prefix per queue category for mutating requests that are queued when offline
  pub queue_routes: BTreeMap<QueueCategory, String>,
  pub fetch_timeout_ms: u64,
  pub notifications: NotificationConfig,
  /// SQLite database holding the cache tiers and the offline queue
  pub database: Option<PathBuf>,
  /// Default tracing filter when RUST_LOG is unset
  pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub icon: String,
  /// Window focused or opened by a default notification click
  pub app_root: String,
  /// Window opened by the "explore" action when the notification carries no url
  pub explore_path: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/icons/icon-192x192.png".to_string(),
      app_root: "/".to_string(),
      explore_path: "/products".to_string(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    let queue_routes = BTreeMap::from([
      (QueueCategory::Cart, "/api/cart".to_string()),
      (QueueCategory::Order, "/api/orders".to_string()),
      (QueueCategory::Wishlist, "/api/wishlist".to_string()),
    ]);

    Self {
      origin: "http://localhost:3000".to_string(),
      generation: "v1".to_string(),
      precache: vec![
        "/".to_string(),
        "/offline.html".to_string(),
        "/manifest.json".to_string(),
        "/icons/icon-192x192.png".to_string(),
        "/icons/icon-512x512.png".to_string(),
      ],
      api_prefix: "/api/".to_string(),
      static_extensions: [
        "js", "mjs", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2",
        "ttf", "webmanifest",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      static_prefixes: vec![
        "/_next/static/".to_string(),
        "/static/".to_string(),
        "/icons/".to_string(),
        "/images/".to_string(),
        "/manifest.json".to_string(),
      ],
      cacheable_api: vec![
        r"^/api/products(/|$)".to_string(),
        r"^/api/categories(/|$)".to_string(),
        r"^/api/shops(/|$)".to_string(),
      ],
      offline_page: "/offline.html".to_string(),
      queue_routes,
      fetch_timeout_ms: 10_000,
      notifications: NotificationConfig::default(),
      database: None,
      log_level: "info".to_string(),
    }
  }
}

fn deserialize_lowercase_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(
    v.into_iter()
      .map(|s| s.trim_start_matches('.').to_lowercase())
      .collect(),
  )
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront-agent.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront-agent/config.yaml
  ///
  /// Falls back to built-in defaults when nothing is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("storefront-agent.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront-agent").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.generation.trim().is_empty() {
      return Err(eyre!("generation must not be empty"));
    }
    config.origin_url()?;
    Ok(config)
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_millis(self.fetch_timeout_ms)
  }

  /// Directory for the database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("storefront-agent"))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("agent.db")),
    }
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }

  /// Resolve an app-relative path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path {} for origin {}: {}", path, self.origin, e))
  }
}
