//! Cache storage trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::key::RequestKey;
use super::traits::CacheEntry;

/// Durable key-value store partitioned into named generations.
///
/// Deleting a generation is all-or-nothing: readers never observe a
/// generation with only part of its entries removed.
pub trait CacheStore: Send + Sync + 'static {
  /// Look up an entry in one generation.
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>>;

  /// Insert or overwrite an entry in an existing generation.
  ///
  /// Returns `false` without writing when the generation does not exist, so
  /// a late write never brings back a purged generation.
  fn put(&self, generation: &str, key: &RequestKey, entry: &CacheEntry) -> Result<bool>;

  /// Write a batch of entries atomically, creating the generation if absent.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, CacheEntry)]) -> Result<()>;

  /// Remove a generation and every entry in it. Returns whether it existed.
  fn delete_generation(&self, generation: &str) -> Result<bool>;

  /// Names of all existing generations, oldest first.
  fn list_generations(&self) -> Result<Vec<String>>;

  /// Keys stored in a generation.
  fn keys(&self, generation: &str) -> Result<Vec<RequestKey>>;

  fn has_generation(&self, generation: &str) -> Result<bool> {
    Ok(self.list_generations()?.iter().any(|g| g == generation))
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the given path, or the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway store that lives in memory.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

-- Responses are stored as serialized JSON
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (generation, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_generation ON entries(generation);
"#;

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to create generation {}: {}", generation, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  entry: &CacheEntry,
) -> Result<()> {
  let data = serde_json::to_vec(&entry.response)
    .map_err(|e| eyre!("Failed to serialize response: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (generation, request_hash, method, url, data, stored_at)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        generation,
        key.digest(),
        key.method(),
        key.url(),
        data,
        entry.stored_at.to_rfc3339()
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStore for SqliteStore {
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, stored_at FROM entries WHERE generation = ? AND request_hash = ?",
        params![generation, key.digest()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    match row {
      Some((data, stored_at)) => {
        let response = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize response for {}: {}", key, e))?;
        let stored_at = parse_datetime(&stored_at)?;
        Ok(Some(CacheEntry {
          response,
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, key: &RequestKey, entry: &CacheEntry) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let exists = tx
      .query_row(
        "SELECT 1 FROM generations WHERE name = ?",
        params![generation],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up generation {}: {}", generation, e))?
      .is_some();
    if !exists {
      return Ok(false);
    }

    insert_entry(&tx, generation, key, entry)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(true)
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, CacheEntry)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, generation)?;
    for (key, entry) in entries {
      insert_entry(&tx, generation, key, entry)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete_generation(&self, generation: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM entries WHERE generation = ?",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", generation, e))?;
    let removed = tx
      .execute("DELETE FROM generations WHERE name = ?", params![generation])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", generation, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read generation name: {}", e))?;

    Ok(names)
  }

  fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT method, url FROM entries WHERE generation = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![generation], |row| {
        Ok(RequestKey::from_parts(row.get(0)?, row.get(1)?))
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", generation, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
