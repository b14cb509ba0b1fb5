//! Core types shared by the store and the interceptor.

use chrono::{DateTime, Utc};

use crate::fetch::Response;

/// A stored response and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub response: Response,
  pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(response: Response) -> Self {
    Self {
      response,
      stored_at: Utc::now(),
    }
  }
}

/// A response handed back to the caller, with metadata about where it came from.
#[derive(Debug, Clone)]
pub struct Served<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: ResponseSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> Served<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: ResponseSource::Network,
      cached_at: None,
    }
  }

  /// Cache hit served without touching the network.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: ResponseSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Network failed, serving the cached copy.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: ResponseSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Request the interceptor does not handle (non-GET, or no active instance).
  pub fn passthrough(data: T) -> Self {
    Self {
      data,
      source: ResponseSource::Passthrough,
      cached_at: None,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Cache-first hit
  Cache,
  /// Network unavailable, fell back to cache
  Offline,
  /// Not intercepted
  Passthrough,
}

impl ResponseSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline",
      Self::Passthrough => "passthrough",
    }
  }
}
