//! Request/response model and the network seam.

mod client;
mod types;

use std::future::Future;

use crate::error::FetchError;

pub use client::HttpFetcher;
pub use types::{Request, Response};

/// The host's request/response primitive.
///
/// Reliable but fallible per call. Implementations own their timeouts; the
/// interceptor never imposes one.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}
