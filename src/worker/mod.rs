//! Interceptor lifecycle, routing and the host that drives it.
//!
//! An instance moves through `Installing -> Installed -> Activating -> Active`
//! and becomes `Redundant` once a newer instance takes over. Only the active
//! instance answers requests.

mod host;
mod interceptor;
mod manifest;
mod routing;
mod state;

pub use host::ServiceHost;
pub use manifest::AssetManifest;
pub use routing::Strategy;
pub use state::WorkerState;

/// Everything one interceptor version needs to know.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Name of the cache generation this version owns
  pub version: String,
  pub manifest: AssetManifest,
  pub strategy: Strategy,
  /// Cache-first misses are stored when set
  pub repopulate_on_miss: bool,
  /// Take over as soon as installed instead of waiting for promotion
  pub skip_waiting: bool,
}
