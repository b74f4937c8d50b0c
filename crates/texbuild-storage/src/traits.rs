use texbuild_core::{ProjectId, TrackedCache};

/// Durable home of a project's [`TrackedCache`] between sessions.
///
/// `load` returns an empty cache when nothing was stored yet or the stored data is unreadable;
/// genuine I/O failures are errors.
pub trait CacheStore: Send + Sync {
    fn load(&self, project: &ProjectId) -> anyhow::Result<TrackedCache>;
    fn save(&self, project: &ProjectId, cache: &TrackedCache) -> anyhow::Result<()>;
    fn clear(&self, project: &ProjectId) -> anyhow::Result<()>;
}
