//! Host runtime that owns interceptor instances and routes requests to the
//! active one.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, Served};
use crate::error::{ActivateError, FetchError, RegisterError};
use crate::fetch::{Fetcher, Request, Response};

use super::interceptor::Interceptor;
use super::{AssetManifest, WorkerConfig};

type Worker<S, F> = Arc<Interceptor<S, F>>;

pub struct ServiceHost<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  active: RwLock<Option<Worker<S, F>>>,
  waiting: RwLock<Option<Worker<S, F>>>,
}

impl<S: CacheStore, F: Fetcher> ServiceHost<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
    Self {
      store,
      fetcher,
      active: RwLock::new(None),
      waiting: RwLock::new(None),
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// The instance currently controlling requests.
  pub fn active(&self) -> Option<Worker<S, F>> {
    self
      .active
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// An installed instance waiting for [`promote`](Self::promote).
  pub fn waiting(&self) -> Option<Worker<S, F>> {
    self
      .waiting
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Install a new version and, if allowed, activate it right away.
  ///
  /// On failure the previously active instance keeps serving.
  pub async fn register(&self, config: WorkerConfig) -> Result<Worker<S, F>, RegisterError> {
    let worker = Arc::new(Interceptor::new(
      config,
      Arc::clone(&self.store),
      Arc::clone(&self.fetcher),
    ));

    if let Err(e) = worker.install().await {
      error!(version = %worker.version(), error = %e, "Registration failed");
      return Err(e.into());
    }
    info!(version = %worker.version(), "Registration succeeded");

    self.enqueue(Arc::clone(&worker)).await?;
    Ok(worker)
  }

  /// Bring up the configured version at process start.
  ///
  /// A generation that is already fully populated is reused without touching
  /// the network; otherwise this is a normal [`register`](Self::register).
  pub async fn start(&self, config: WorkerConfig) -> Result<Worker<S, F>, RegisterError> {
    match Interceptor::<S, F>::is_installed(&config, &self.store) {
      Ok(true) => {
        debug!(version = %config.version, "Restoring installed generation");
        let worker = Arc::new(Interceptor::restore(
          config,
          Arc::clone(&self.store),
          Arc::clone(&self.fetcher),
        ));
        self.set_waiting(Arc::clone(&worker));
        self.promote().await?;
        Ok(worker)
      }
      Ok(false) => {
        self.resume_previous(&config).await?;
        self.register(config).await
      }
      Err(e) => {
        warn!(error = %e, "Could not inspect cache, reinstalling");
        self.register(config).await
      }
    }
  }

  /// Put the newest generation other than `config.version` back in control,
  /// standing in for the instance a previous run left active.
  ///
  /// Does nothing if an instance is already active or no other generation
  /// exists.
  pub async fn resume_previous(
    &self,
    config: &WorkerConfig,
  ) -> Result<Option<Worker<S, F>>, ActivateError> {
    if self.active().is_some() {
      return Ok(None);
    }

    let generations = self
      .store
      .list_generations()
      .map_err(|e| ActivateError::Storage {
        message: e.to_string(),
      })?;
    let Some(previous) = generations
      .into_iter()
      .rev()
      .find(|g| *g != config.version)
    else {
      return Ok(None);
    };

    debug!(version = %previous, "Resuming previous generation");
    let worker = Arc::new(Interceptor::restore(
      WorkerConfig {
        version: previous,
        manifest: AssetManifest::default(),
        ..config.clone()
      },
      Arc::clone(&self.store),
      Arc::clone(&self.fetcher),
    ));
    self.set_waiting(worker);
    self.promote().await
  }

  async fn enqueue(&self, worker: Worker<S, F>) -> Result<(), ActivateError> {
    let eager = worker.config().skip_waiting || self.active().is_none();
    self.set_waiting(worker);

    if eager {
      self.promote().await?;
    }
    Ok(())
  }

  fn set_waiting(&self, worker: Worker<S, F>) {
    let replaced = self
      .waiting
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .replace(worker);
    if let Some(old) = replaced {
      old.retire();
    }
  }

  /// Activate the waiting instance and hand it every subsequent request.
  ///
  /// Returns `None` when nothing is waiting.
  pub async fn promote(&self) -> Result<Option<Worker<S, F>>, ActivateError> {
    let next = self
      .waiting
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    let Some(worker) = next else {
      return Ok(None);
    };

    if let Err(e) = worker.activate().await {
      error!(version = %worker.version(), error = %e, "Activation failed");
      self
        .waiting
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .get_or_insert(worker);
      return Err(e);
    }

    let previous = self
      .active
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .replace(Arc::clone(&worker));
    if let Some(previous) = previous {
      previous.retire();
    }

    info!(version = %worker.version(), "Interceptor now controls all requests");
    Ok(Some(worker))
  }

  /// Send a request through the active instance, or straight to the network
  /// when none is active.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served<Response>, FetchError> {
    let Some(worker) = self.active() else {
      debug!(url = %request.url, "No active interceptor, fetching directly");
      return self.fetcher.fetch(request).await.map(Served::passthrough);
    };

    match worker.handle_fetch(request).await {
      // Replaced between lookup and call; the new instance takes it
      Err(FetchError::Inactive { .. }) => match self.active() {
        Some(current) if !Arc::ptr_eq(&current, &worker) => current.handle_fetch(request).await,
        _ => self.fetcher.fetch(request).await.map(Served::passthrough),
      },
      result => result,
    }
  }

  /// Wait for background cache writes of the live instances.
  pub async fn settle(&self) {
    for worker in [self.active(), self.waiting()].into_iter().flatten() {
      worker.settle().await;
    }
  }
}
