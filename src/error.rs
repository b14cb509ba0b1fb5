//! Error taxonomy for the interceptor.
//!
//! Storage and CLI plumbing use `color_eyre::Result`; the errors here are the
//! ones callers need to match on.

use thiserror::Error;

use crate::worker::WorkerState;

/// Failure of a single request.
///
/// When the network fails and the cache has nothing to offer, this is handed
/// back to the caller exactly as the fetcher produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  #[error("network request to {url} failed: {message}")]
  Network { url: String, message: String },

  #[error("network request to {url} timed out")]
  Timeout { url: String },

  #[error("interceptor is {state}, not active")]
  Inactive { state: WorkerState },
}

/// Failure to populate a new cache generation.
#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to fetch asset {url}: {source}")]
  Asset {
    url: String,
    #[source]
    source: FetchError,
  },

  #[error("asset {url} returned status {status}")]
  BadStatus { url: String, status: u16 },

  #[error("failed to commit generation {generation}: {message}")]
  Storage { generation: String, message: String },

  #[error("cannot install from state {state}")]
  InvalidState { state: WorkerState },
}

/// Failure while purging stale generations and taking over.
#[derive(Debug, Error)]
pub enum ActivateError {
  #[error("failed to purge stale generations: {message}")]
  Storage { message: String },

  #[error("cannot activate from state {state}")]
  InvalidState { state: WorkerState },
}

/// Failure to bring a new version into service.
#[derive(Debug, Error)]
pub enum RegisterError {
  #[error(transparent)]
  Install(#[from] InstallError),

  #[error(transparent)]
  Activate(#[from] ActivateError),
}
