use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;
use tracing::debug;

use super::types::{Method, Request, Response};
use crate::error::{AgentError, AgentResult};

/// Live network seam. Every call the agent makes to the upstream goes through here.
pub trait Transport: Send + Sync {
  fn send(&self, request: Request) -> BoxFuture<'static, AgentResult<Response>>;
}

/// Transport backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(connect_timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .connect_timeout(connect_timeout)
      .user_agent(concat!("storefront-agent/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: Request) -> BoxFuture<'static, AgentResult<Response>> {
    let client = self.client.clone();
    async move {
      debug!(method = %request.method, url = %request.url, "live fetch");

      let mut builder = client.request(to_reqwest_method(request.method), request.url.clone());
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| AgentError::NetworkUnavailable(format!("{}: {}", request.url, e)))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
      let body = response
        .bytes()
        .await
        .map_err(|e| AgentError::NetworkUnavailable(format!("{}: {}", request.url, e)))?
        .to_vec();

      Ok(Response {
        status,
        headers,
        body,
      })
    }
    .boxed()
  }
}
