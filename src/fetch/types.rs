use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// How a request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  /// Anything else (scripts, styles, images, XHR)
  #[default]
  Subresource,
}

/// An outbound request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Subresource,
      body: None,
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      ..Self::get(url)
    }
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  /// Whether the request targets an HTML document.
  pub fn is_document(&self) -> bool {
    self.mode == RequestMode::Navigate || self.url.path().ends_with(".html")
  }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  /// Final URL after redirects
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_navigation_is_document() {
    let req = Request::navigate(url("https://example.com/"));
    assert!(req.is_document());
  }

  #[test]
  fn test_html_path_is_document() {
    let req = Request::get(url("https://example.com/index.html"));
    assert!(req.is_document());
  }

  #[test]
  fn test_script_is_not_document() {
    let req = Request::get(url("https://example.com/app.js"));
    assert!(!req.is_document());
  }

  #[test]
  fn test_html_in_query_is_not_document() {
    let req = Request::get(url("https://example.com/app.js?next=index.html"));
    assert!(!req.is_document());
  }

  #[test]
  fn test_response_success_range() {
    let mut resp = Response {
      url: "https://example.com/".into(),
      status: 204,
      headers: vec![("Content-Type".into(), "text/html".into())],
      body: Vec::new(),
    };
    assert!(resp.is_success());
    assert_eq!(resp.header("content-type"), Some("text/html"));

    resp.status = 304;
    assert!(!resp.is_success());
  }
}
