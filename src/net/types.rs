//! Request and response values exchanged between the host, the agent and the transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Whether requests with this method change server state.
  pub fn is_mutating(&self) -> bool {
    matches!(
      self,
      Method::Post | Method::Put | Method::Patch | Method::Delete
    )
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Method {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "HEAD" => Ok(Method::Head),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "PATCH" => Ok(Method::Patch),
      "DELETE" => Ok(Method::Delete),
      other => Err(format!("unsupported method {}", other)),
    }
  }
}

/// An outbound request issued by the foreground app.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn new(method: Method, url: Url, body: Option<Vec<u8>>) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
      body,
    }
  }

  /// Cache key: method plus absolute URL without fragment.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    format!("{} {}", self.method, url)
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }
}

/// A response returned to the foreground app, live or replayed from a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  #[cfg(test)]
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self {
      status,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: value.to_string().into_bytes(),
    }
  }

  pub fn html(status: u16, body: &str) -> Self {
    Self {
      status,
      headers: vec![(
        "content-type".to_string(),
        "text/html; charset=utf-8".to_string(),
      )],
      body: body.as_bytes().to_vec(),
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_key_drops_fragment() {
    let request = Request::get(Url::parse("https://shop.test/products?page=2#top").unwrap());
    assert_eq!(request.cache_key(), "GET https://shop.test/products?page=2");
  }

  #[test]
  fn test_method_parse_case_insensitive() {
    assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
    assert!("TRACE".parse::<Method>().is_err());
    assert!(Method::Delete.is_mutating());
    assert!(!Method::Head.is_mutating());
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response = Response::new(200, "ok").with_header("Content-Type", "text/plain");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert!(response.is_success());
    assert!(!Response::new(304, "").is_success());
  }
}
