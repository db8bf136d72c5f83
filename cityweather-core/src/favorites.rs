//! Durable storage of "My List": a text file with one city name per line.

use anyhow::{Context, Result};
use std::{
    collections::BTreeSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::geocode::GeocodeResolver;

#[derive(Debug, Clone)]
pub struct FavoritesStore {
    path: PathBuf,
}

impl FavoritesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names stored on disk, without any lookups. A missing file is empty.
    pub fn read_names(&self) -> Result<Vec<String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read favorites file: {}", self.path.display())
                });
            }
        };

        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Load saved favorites, keeping only names that still resolve.
    pub async fn load(&self, resolver: &GeocodeResolver) -> Result<BTreeSet<String>> {
        let mut favorites = BTreeSet::new();

        for name in self.read_names()? {
            if favorites.contains(&name) {
                continue;
            }
            match resolver.resolve_name(&name).await {
                Ok(_) => {
                    favorites.insert(name);
                }
                Err(e) => {
                    tracing::warn!(city = %name, "dropping saved favorite: {e}");
                }
            }
        }

        tracing::info!(count = favorites.len(), path = %self.path.display(), "loaded My List");
        Ok(favorites)
    }

    /// Overwrite the file with `names`, one per line, sorted.
    pub fn save(&self, names: &BTreeSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create favorites directory: {}", parent.display())
            })?;
        }

        let mut contents = String::new();
        for name in names {
            contents.push_str(name);
            contents.push('\n');
        }

        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write favorites file: {}", self.path.display()))?;

        tracing::debug!(count = names.len(), path = %self.path.display(), "saved My List");
        Ok(())
    }
}
