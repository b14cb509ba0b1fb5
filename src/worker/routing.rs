use serde::Deserialize;

use crate::fetch::Request;

/// Request routing policy, chosen per deployment.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Every GET goes to the network first, cache only on failure
  #[default]
  NetworkFirst,
  /// Documents network-first, everything else cache-first
  NavigationNetworkFirst,
}

/// What the interceptor does with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Straight to the network, cache untouched
  Passthrough,
  NetworkFirst,
  CacheFirst,
}

impl Strategy {
  pub fn route(self, request: &Request) -> Route {
    if !request.is_get() {
      return Route::Passthrough;
    }

    match self {
      Self::NetworkFirst => Route::NetworkFirst,
      Self::NavigationNetworkFirst if request.is_document() => Route::NetworkFirst,
      Self::NavigationNetworkFirst => Route::CacheFirst,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn url(path: &str) -> Url {
    Url::parse("https://example.com").unwrap().join(path).unwrap()
  }

  #[test]
  fn test_network_first_routes_every_get() {
    let strategy = Strategy::NetworkFirst;
    assert_eq!(strategy.route(&Request::get(url("/app.js"))), Route::NetworkFirst);
    assert_eq!(strategy.route(&Request::navigate(url("/"))), Route::NetworkFirst);
  }

  #[test]
  fn test_navigation_strategy_splits_documents() {
    let strategy = Strategy::NavigationNetworkFirst;
    assert_eq!(strategy.route(&Request::navigate(url("/"))), Route::NetworkFirst);
    assert_eq!(
      strategy.route(&Request::get(url("/index.html"))),
      Route::NetworkFirst
    );
    assert_eq!(strategy.route(&Request::get(url("/app.js"))), Route::CacheFirst);
    assert_eq!(
      strategy.route(&Request::get(url("/icon/512.png"))),
      Route::CacheFirst
    );
  }

  #[test]
  fn test_non_get_passes_through() {
    for strategy in [Strategy::NetworkFirst, Strategy::NavigationNetworkFirst] {
      let post = Request::new(Method::POST, url("/index.html"));
      assert_eq!(strategy.route(&post), Route::Passthrough);
      let head = Request::new(Method::HEAD, url("/app.js"));
      assert_eq!(strategy.route(&head), Route::Passthrough);
    }
  }
}
