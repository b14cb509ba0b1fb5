use std::time::Duration;

use color_eyre::{eyre::eyre, Result};

use crate::config::NetworkConfig;
use crate::error::FetchError;

use super::types::{Request, Response};
use super::Fetcher;

/// Network fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(config: &NetworkConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(config.user_agent.as_str())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  async fn send(&self, request: &Request) -> reqwest::Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let url = response.url().to_string();
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
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      url,
      status,
      headers,
      body,
    })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    self.send(request).await.map_err(|e| {
      let url = request.url.to_string();
      if e.is_timeout() {
        FetchError::Timeout { url }
      } else {
        FetchError::Network {
          url,
          message: e.to_string(),
        }
      }
    })
  }
}
