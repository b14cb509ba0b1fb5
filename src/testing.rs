//! In-memory doubles for the store and the network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::{CacheEntry, CacheStore, RequestKey};
use crate::error::FetchError;
use crate::fetch::{Fetcher, Request, Response};

pub const ORIGIN: &str = "https://cardio.example";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn ok(path: &str, body: &str) -> Response {
  Response {
    url: url(path).to_string(),
    status: 200,
    headers: vec![("content-type".into(), "text/plain".into())],
    body: body.as_bytes().to_vec(),
  }
}

/// Store that keeps every generation in a map.
#[derive(Default)]
pub struct MemoryStore {
  generations: Mutex<Vec<(String, Vec<(RequestKey, CacheEntry)>)>>,
  fail_writes: AtomicBool,
  writes: AtomicUsize,
  gate: Mutex<()>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent write fail, as if storage quota ran out.
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Block every write until the returned guard is dropped.
  pub fn hold_writes(&self) -> MutexGuard<'_, ()> {
    self.gate.lock().unwrap()
  }

  /// Number of successful write batches.
  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  pub fn body(&self, generation: &str, path: &str) -> Option<Vec<u8>> {
    self
      .get(generation, &RequestKey::get(&url(path)))
      .unwrap()
      .map(|entry| entry.response.body)
  }
}

impl MemoryStore {
  fn write(
    &self,
    generation: &str,
    entries: &[(RequestKey, CacheEntry)],
    create: bool,
  ) -> Result<bool> {
    let _gate = self.gate.lock().unwrap();
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("quota exceeded"));
    }

    let mut generations = self.generations.lock().unwrap();
    let index = match generations.iter().position(|(name, _)| name == generation) {
      Some(index) => index,
      None if create => {
        generations.push((generation.to_string(), Vec::new()));
        generations.len() - 1
      }
      None => return Ok(false),
    };

    let stored = &mut generations[index].1;
    for (key, entry) in entries {
      match stored.iter_mut().find(|(k, _)| k == key) {
        Some(existing) => existing.1 = entry.clone(),
        None => stored.push((key.clone(), entry.clone())),
      }
    }

    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(true)
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
    let generations = self.generations.lock().unwrap();
    Ok(
      generations
        .iter()
        .find(|(name, _)| name == generation)
        .and_then(|(_, entries)| entries.iter().find(|(k, _)| k == key))
        .map(|(_, entry)| entry.clone()),
    )
  }

  fn put(&self, generation: &str, key: &RequestKey, entry: &CacheEntry) -> Result<bool> {
    self.write(generation, &[(key.clone(), entry.clone())], false)
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, CacheEntry)]) -> Result<()> {
    self.write(generation, entries, true).map(|_| ())
  }

  fn delete_generation(&self, generation: &str) -> Result<bool> {
    let mut generations = self.generations.lock().unwrap();
    let before = generations.len();
    generations.retain(|(name, _)| name != generation);
    Ok(generations.len() != before)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let generations = self.generations.lock().unwrap();
    Ok(generations.iter().map(|(name, _)| name.clone()).collect())
  }

  fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
    let generations = self.generations.lock().unwrap();
    Ok(
      generations
        .iter()
        .find(|(name, _)| name == generation)
        .map(|(_, entries)| entries.iter().map(|(k, _)| k.clone()).collect())
        .unwrap_or_default(),
    )
  }
}

/// Scripted network. Unknown URLs answer 404.
pub struct FakeFetcher {
  routes: Mutex<HashMap<String, Response>>,
  unreachable: Mutex<HashSet<String>>,
  online: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl Default for FakeFetcher {
  fn default() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      unreachable: Mutex::new(HashSet::new()),
      online: AtomicBool::new(true),
      calls: Mutex::new(Vec::new()),
    }
  }
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn serve(&self, path: &str, body: &str) -> &Self {
    self.serve_response(path, ok(path, body))
  }

  pub fn serve_response(&self, path: &str, response: Response) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url(path).to_string(), response);
    self
  }

  /// Make one URL fail at the network level.
  pub fn unreachable(&self, path: &str) -> &Self {
    self.unreachable.lock().unwrap().insert(url(path).to_string());
    self
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// Requests seen so far, as `"METHOD url"`.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

}

impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let url = request.url.to_string();
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{} {}", request.method, url));

    if !self.online.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&url) {
      return Err(FetchError::Network {
        url,
        message: "connection refused".into(),
      });
    }

    let routes = self.routes.lock().unwrap();
    Ok(routes.get(&url).cloned().unwrap_or_else(|| Response {
      url: url.clone(),
      status: 404,
      headers: Vec::new(),
      body: b"not found".to_vec(),
    }))
  }
}
