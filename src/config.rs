use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::{AssetManifest, Strategy, WorkerConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL the asset paths and fetched paths are resolved against
  pub origin: Url,
  /// Cache generation name; bump whenever assets or strategy change
  pub version: String,
  /// Relative paths that make up the offline shell
  pub assets: Vec<String>,
  #[serde(default)]
  pub strategy: Strategy,
  /// Store cold cache-first misses (navigation-network-first only)
  #[serde(default)]
  pub repopulate_on_miss: bool,
  /// Activate a freshly installed version without waiting
  #[serde(default = "default_skip_waiting")]
  pub skip_waiting: bool,
  /// Cache database location (defaults to $XDG_DATA_HOME/shellcache/cache.db)
  pub cache_path: Option<PathBuf>,
  #[serde(default)]
  pub network: NetworkConfig,
  /// Also write logs to daily files in this directory
  pub log_dir: Option<PathBuf>,
}

fn default_skip_waiting() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_user_agent() -> String {
  concat!("shellcache/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shellcache/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    if self.origin.cannot_be_a_base() {
      return Err(eyre!("origin {} cannot be used as a base URL", self.origin));
    }
    Ok(())
  }

  /// Resolve a path or absolute URL against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  pub fn worker_config(&self) -> Result<WorkerConfig> {
    Ok(WorkerConfig {
      version: self.version.clone(),
      manifest: AssetManifest::resolve(&self.origin, &self.assets)?,
      strategy: self.strategy,
      repopulate_on_miss: self.repopulate_on_miss,
      skip_waiting: self.skip_waiting,
    })
  }
}
