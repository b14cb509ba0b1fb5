//! Versioned response cache.
//!
//! Responses are grouped into named generations. One generation is current
//! per deployment; older ones are purged when a new interceptor activates.

mod key;
mod storage;
mod traits;

pub use key::RequestKey;
pub use storage::{CacheStore, SqliteStore};
pub use traits::{CacheEntry, ResponseSource, Served};
