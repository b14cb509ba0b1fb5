use std::collections::HashSet;

use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::RequestKey;

/// Ordered set of assets a generation must hold once installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
  assets: Vec<Url>,
}

impl AssetManifest {
  /// Build a manifest, dropping later duplicates (fragments ignored).
  pub fn new(assets: impl IntoIterator<Item = Url>) -> Self {
    let mut seen = HashSet::new();
    let assets = assets
      .into_iter()
      .filter(|url| seen.insert(RequestKey::get(url)))
      .collect();
    Self { assets }
  }

  /// Resolve relative asset paths against an origin.
  pub fn resolve(origin: &Url, paths: &[String]) -> Result<Self> {
    let assets = paths
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map_err(|e| eyre!("Invalid asset path {}: {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self::new(assets))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Url> {
    self.assets.iter()
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = RequestKey> + '_ {
    self.assets.iter().map(RequestKey::get)
  }
}
