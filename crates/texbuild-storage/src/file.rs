use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use texbuild_core::{ProjectId, TrackedCache};
use tracing::warn;

use crate::traits::CacheStore;

/// One JSON file per project under `root`, mapping relative paths to timestamps.
#[derive(Clone, Debug)]
pub struct FileCacheStore {
    pub root: PathBuf,
}

impl FileCacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn cache_path(&self, project: &ProjectId) -> PathBuf {
        self.root.join(format!("{}.json", project.as_str()))
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, project: &ProjectId) -> Result<TrackedCache> {
        let path = self.cache_path(project);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TrackedCache::default()),
            Err(e) => return Err(e).with_context(|| format!("read file cache {}", path.display())),
        };
        match serde_json::from_slice(&bytes) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                warn!("discarding unreadable file cache {}: {e}", path.display());
                Ok(TrackedCache::default())
            }
        }
    }

    fn save(&self, project: &ProjectId, cache: &TrackedCache) -> Result<()> {
        std::fs::create_dir_all(&self.root).with_context(|| format!("create cache dir {}", self.root.display()))?;
        let path = self.cache_path(project);
        let bytes = serde_json::to_vec_pretty(cache)?;
        write_replace(&path, &bytes).with_context(|| format!("write file cache {}", path.display()))?;
        Ok(())
    }

    fn clear(&self, project: &ProjectId) -> Result<()> {
        let path = self.cache_path(project);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove file cache {}", path.display())),
        }
    }
}

/// Writes next to `path` first so readers never observe a half-written cache.
fn write_replace(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
