//! The offline cache interceptor.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join_all;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore, RequestKey, Served};
use crate::error::{ActivateError, FetchError, InstallError};
use crate::fetch::{Fetcher, Request, Response};

use super::routing::Route;
use super::state::{Lifecycle, WorkerState};
use super::WorkerConfig;

/// One version of the interceptor.
///
/// Owns the lifecycle of its cache generation (named by the configured
/// version) and answers requests once active.
pub struct Interceptor<S: CacheStore, F: Fetcher> {
  config: WorkerConfig,
  store: Arc<S>,
  fetcher: Arc<F>,
  lifecycle: Arc<Lifecycle>,
  /// Background cache writes; not tied to any caller
  writes: Mutex<JoinSet<()>>,
}

impl<S: CacheStore, F: Fetcher> Interceptor<S, F> {
  /// Create a fresh instance that still has to install.
  pub fn new(config: WorkerConfig, store: Arc<S>, fetcher: Arc<F>) -> Self {
    Self::with_state(config, store, fetcher, WorkerState::Installing)
  }

  /// Re-create an instance whose generation is already populated.
  pub fn restore(config: WorkerConfig, store: Arc<S>, fetcher: Arc<F>) -> Self {
    Self::with_state(config, store, fetcher, WorkerState::Installed)
  }

  fn with_state(config: WorkerConfig, store: Arc<S>, fetcher: Arc<F>, state: WorkerState) -> Self {
    Self {
      config,
      store,
      fetcher,
      lifecycle: Arc::new(Lifecycle::new(state)),
      writes: Mutex::new(JoinSet::new()),
    }
  }

  pub fn version(&self) -> &str {
    &self.config.version
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.get()
  }

  /// Whether the store already holds every manifest asset for this version.
  pub fn is_installed(config: &WorkerConfig, store: &S) -> color_eyre::Result<bool> {
    if !store.has_generation(&config.version)? {
      return Ok(false);
    }
    let stored = store.keys(&config.version)?;
    Ok(config.manifest.keys().all(|key| stored.contains(&key)))
  }

  /// Fetch every manifest asset and commit them as this version's generation.
  ///
  /// Nothing is written unless every asset arrived with a 2xx status.
  pub async fn install(&self) -> Result<(), InstallError> {
    let state = self.state();
    if state != WorkerState::Installing {
      return Err(InstallError::InvalidState { state });
    }

    info!(
      version = %self.config.version,
      assets = self.config.manifest.len(),
      "Installing cache generation"
    );

    let fetches = self.config.manifest.iter().map(|url| {
      let request = Request::get(url.clone());
      async move {
        let response = self
          .fetcher
          .fetch(&request)
          .await
          .map_err(|source| InstallError::Asset {
            url: url.to_string(),
            source,
          })?;

        if !response.is_success() {
          return Err(InstallError::BadStatus {
            url: url.to_string(),
            status: response.status,
          });
        }

        Ok::<_, InstallError>((RequestKey::for_request(&request), CacheEntry::new(response)))
      }
    });
    let entries = try_join_all(fetches).await?;

    self
      .store
      .put_all(&self.config.version, &entries)
      .map_err(|e| InstallError::Storage {
        generation: self.config.version.clone(),
        message: e.to_string(),
      })?;

    self
      .lifecycle
      .transition(WorkerState::Installed)
      .map_err(|state| InstallError::InvalidState { state })?;

    info!(version = %self.config.version, "Cache generation installed");
    Ok(())
  }

  /// Purge every generation but this one and become the active instance.
  pub async fn activate(&self) -> Result<(), ActivateError> {
    self
      .lifecycle
      .transition(WorkerState::Activating)
      .map_err(|state| ActivateError::InvalidState { state })?;

    if let Err(e) = self.purge_stale() {
      let _ = self.lifecycle.transition(WorkerState::Installed);
      return Err(e);
    }

    self
      .lifecycle
      .transition(WorkerState::Active)
      .map_err(|state| ActivateError::InvalidState { state })?;

    info!(version = %self.config.version, "Interceptor active");
    Ok(())
  }

  fn purge_stale(&self) -> Result<(), ActivateError> {
    let generations = self
      .store
      .list_generations()
      .map_err(|e| ActivateError::Storage {
        message: e.to_string(),
      })?;

    for generation in generations
      .iter()
      .filter(|g| g.as_str() != self.config.version)
    {
      self
        .evict(generation)
        .map_err(|e| ActivateError::Storage {
          message: e.to_string(),
        })?;
    }

    Ok(())
  }

  /// Remove a superseded generation in one step.
  pub fn evict(&self, generation: &str) -> color_eyre::Result<bool> {
    let removed = self.store.delete_generation(generation)?;
    if removed {
      info!(generation, "Evicted stale cache generation");
    }
    Ok(removed)
  }

  /// Mark this instance as superseded.
  pub(crate) fn retire(&self) {
    match self.lifecycle.transition(WorkerState::Redundant) {
      Ok(_) => debug!(version = %self.config.version, "Interceptor redundant"),
      Err(state) => debug!(version = %self.config.version, %state, "Interceptor not retired"),
    }
  }

  /// Answer one request according to the configured strategy.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served<Response>, FetchError> {
    let state = self.state();
    if state != WorkerState::Active {
      return Err(FetchError::Inactive { state });
    }

    let route = self.config.strategy.route(request);
    debug!(method = %request.method, url = %request.url, ?route, "Routing request");

    match route {
      Route::Passthrough => self
        .fetcher
        .fetch(request)
        .await
        .map(Served::passthrough),
      Route::NetworkFirst => self.network_first(request).await,
      Route::CacheFirst => self.cache_first(request).await,
    }
  }

  async fn network_first(&self, request: &Request) -> Result<Served<Response>, FetchError> {
    let key = RequestKey::for_request(request);

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_in_background(key, response.clone());
        }
        Ok(Served::from_network(response))
      }
      Err(err) => match self.lookup(&key) {
        Some(entry) => {
          debug!(%key, error = %err, "Network failed, serving cached copy");
          Ok(Served::offline(entry.response, entry.stored_at))
        }
        None => Err(err),
      },
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<Served<Response>, FetchError> {
    let key = RequestKey::for_request(request);

    if let Some(entry) = self.lookup(&key) {
      return Ok(Served::from_cache(entry.response, entry.stored_at));
    }

    let response = self.fetcher.fetch(request).await?;
    if self.config.repopulate_on_miss && response.is_success() {
      self.store_in_background(key, response.clone());
    }
    Ok(Served::from_network(response))
  }

  /// Read from the current generation; storage errors count as a miss.
  fn lookup(&self, key: &RequestKey) -> Option<CacheEntry> {
    match self.store.get(&self.config.version, key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(%key, error = %e, "Cache read failed");
        None
      }
    }
  }

  /// Write a response without holding up the caller. Failures are only logged.
  fn store_in_background(&self, key: RequestKey, response: Response) {
    let store = Arc::clone(&self.store);
    let lifecycle = Arc::clone(&self.lifecycle);
    let generation = self.config.version.clone();

    let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
    // Reap finished writes so the set stays small
    while writes.try_join_next().is_some() {}

    writes.spawn_blocking(move || {
      // A superseded instance must not resurrect its purged generation
      if lifecycle.get() == WorkerState::Redundant {
        return;
      }
      match store.put(&generation, &key, &CacheEntry::new(response)) {
        Ok(true) => {}
        Ok(false) => debug!(%key, generation, "Generation gone, dropping cache write"),
        Err(e) => warn!(%key, error = %e, "Cache write failed"),
      }
    });
  }

  /// Wait for all background cache writes started so far.
  pub async fn settle(&self) {
    let mut pending = {
      let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
      std::mem::take(&mut *writes)
    };

    while let Some(result) = pending.join_next().await {
      if let Err(e) = result {
        warn!(error = %e, "Cache write task failed");
      }
    }
  }
}

impl<S: CacheStore, F: Fetcher> Drop for Interceptor<S, F> {
  fn drop(&mut self) {
    // Let in-flight writes finish on their own
    self
      .writes
      .get_mut()
      .unwrap_or_else(PoisonError::into_inner)
      .detach_all();
  }
}

impl<S: CacheStore, F: Fetcher> fmt::Debug for Interceptor<S, F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Interceptor")
      .field("version", &self.config.version)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
