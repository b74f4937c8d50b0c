use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use texbuild_core::{ProjectId, TrackedCache};

use crate::traits::CacheStore;

/// In-memory store for tests. Not durable.
#[derive(Default)]
pub struct InMemoryCacheStore {
    inner: Mutex<HashMap<String, TrackedCache>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, HashMap<String, TrackedCache>>> {
        self.inner.lock().map_err(|_| anyhow!("cache store lock poisoned"))
    }
}

impl CacheStore for InMemoryCacheStore {
    fn load(&self, project: &ProjectId) -> anyhow::Result<TrackedCache> {
        Ok(self.lock()?.get(project.as_str()).cloned().unwrap_or_default())
    }

    fn save(&self, project: &ProjectId, cache: &TrackedCache) -> anyhow::Result<()> {
        self.lock()?.insert(project.as_str().to_string(), cache.clone());
        Ok(())
    }

    fn clear(&self, project: &ProjectId) -> anyhow::Result<()> {
        self.lock()?.remove(project.as_str());
        Ok(())
    }
}
