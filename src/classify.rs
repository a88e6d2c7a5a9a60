//! Request classification: which strategy and tier a GET request belongs to.

use color_eyre::{eyre::eyre, Result};
use regex::RegexSet;

use crate::config::Config;
use crate::net::{Method, Request};

/// Category of a cacheable (GET) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
  Static,
  Api,
  Navigation,
}

#[derive(Debug, Clone)]
pub struct Classifier {
  api_prefix: String,
  static_extensions: Vec<String>,
  static_prefixes: Vec<String>,
  cacheable_api: RegexSet,
}

impl Classifier {
  pub fn new(config: &Config) -> Result<Self> {
    let cacheable_api = RegexSet::new(&config.cacheable_api)
      .map_err(|e| eyre!("Invalid cacheable_api pattern: {}", e))?;

    Ok(Self {
      api_prefix: config.api_prefix.clone(),
      static_extensions: config.static_extensions.clone(),
      static_prefixes: config.static_prefixes.clone(),
      cacheable_api,
    })
  }

  /// Classify a request. Non-GET requests get no category and bypass the tiers.
  pub fn classify(&self, request: &Request) -> Option<Category> {
    if request.method != Method::Get {
      return None;
    }

    let path = request.path();
    if path.starts_with(&self.api_prefix) {
      Some(Category::Api)
    } else if self.is_static_path(path) {
      Some(Category::Static)
    } else {
      Some(Category::Navigation)
    }
  }

  fn is_static_path(&self, path: &str) -> bool {
    if self
      .static_prefixes
      .iter()
      .any(|prefix| path.starts_with(prefix.as_str()))
    {
      return true;
    }

    let file_name = path.rsplit('/').next().unwrap_or_default();
    match file_name.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => {
        let ext = ext.to_ascii_lowercase();
        self.static_extensions.iter().any(|e| *e == ext)
      }
      _ => false,
    }
  }

  /// Whether an API response for this request may be stored in the api tier.
  pub fn is_cacheable_api(&self, request: &Request) -> bool {
    self.cacheable_api.is_match(request.path())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn classifier() -> Classifier {
    Classifier::new(&Config::default()).unwrap()
  }

  fn get(path: &str) -> Request {
    Request::get(Url::parse("http://shop.test").unwrap().join(path).unwrap())
  }

  #[test]
  fn test_api_prefix_wins_over_extension() {
    assert_eq!(
      classifier().classify(&get("/api/products/export.json")),
      Some(Category::Api)
    );
  }

  #[test]
  fn test_static_by_extension_and_prefix() {
    let c = classifier();
    assert_eq!(c.classify(&get("/app.js")), Some(Category::Static));
    assert_eq!(c.classify(&get("/styles/site.CSS")), Some(Category::Static));
    assert_eq!(c.classify(&get("/logo.png?v=3")), Some(Category::Static));
    assert_eq!(c.classify(&get("/manifest.json")), Some(Category::Static));
    assert_eq!(
      c.classify(&get("/_next/static/chunks/main")),
      Some(Category::Static)
    );
  }

  #[test]
  fn test_everything_else_is_navigation() {
    let c = classifier();
    assert_eq!(c.classify(&get("/")), Some(Category::Navigation));
    assert_eq!(c.classify(&get("/shops/42")), Some(Category::Navigation));
    assert_eq!(c.classify(&get("/.well-known")), Some(Category::Navigation));
    assert_eq!(c.classify(&get("/apiary")), Some(Category::Navigation));
  }

  #[test]
  fn test_non_get_is_not_classified() {
    let mut request = get("/api/cart");
    request.method = Method::Post;
    assert_eq!(classifier().classify(&request), None);

    let mut request = get("/app.js");
    request.method = Method::Head;
    assert_eq!(classifier().classify(&request), None);
  }

  #[test]
  fn test_allow_list() {
    let c = classifier();
    assert!(c.is_cacheable_api(&get("/api/products")));
    assert!(c.is_cacheable_api(&get("/api/products/17?expand=shop")));
    assert!(!c.is_cacheable_api(&get("/api/productsearch")));
    assert!(!c.is_cacheable_api(&get("/api/orders")));
  }
}
