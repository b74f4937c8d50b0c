use std::collections::BTreeMap;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::RelPath;

/// Modification marker of a file: nanoseconds between the Unix epoch and its mtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_system_time(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)),
            Err(e) => Self(i64::try_from(e.duration().as_nanos()).map(|n| -n).unwrap_or(i64::MIN)),
        }
    }
}

/// Result of one directory scan. Built once, then only read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<RelPath, Timestamp>,
}

impl Snapshot {
    pub fn new(files: BTreeMap<RelPath, Timestamp>) -> Self {
        Self { files }
    }

    pub fn get(&self, path: &RelPath) -> Option<Timestamp> {
        self.files.get(path).copied()
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.files.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, Timestamp)> {
        self.files.iter().map(|(p, t)| (p, *t))
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn without<'a>(&self, paths: impl IntoIterator<Item = &'a RelPath>) -> Snapshot {
        let mut files = self.files.clone();
        for p in paths {
            files.remove(p);
        }
        Snapshot { files }
    }

    pub fn with(&self, extra: impl IntoIterator<Item = (RelPath, Timestamp)>) -> Snapshot {
        let mut files = self.files.clone();
        files.extend(extra);
        Snapshot { files }
    }
}

impl FromIterator<(RelPath, Timestamp)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (RelPath, Timestamp)>>(iter: I) -> Self {
        Self { files: iter.into_iter().collect() }
    }
}

/// Last observed state of one tracked file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    pub stamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl TrackedEntry {
    pub fn new(stamp: Timestamp, digest: Option<String>) -> Self {
        Self { stamp, digest }
    }
}

/// Tracked build files and their last observed state, persisted across sessions. Nothing is
/// dropped except by [`TrackedCache::clear`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedCache {
    entries: BTreeMap<RelPath, TrackedEntry>,
}

impl TrackedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &RelPath) -> Option<&TrackedEntry> {
        self.entries.get(path)
    }

    pub fn stamp(&self, path: &RelPath) -> Option<Timestamp> {
        self.entries.get(path).map(|e| e.stamp)
    }

    /// Records `stamp` for `path` and reports whether the file changed. On a new stamp the content
    /// hash decides; if `digest` fails the cache is left as it was.
    pub fn merge<F>(&mut self, path: RelPath, stamp: Timestamp, digest: F) -> io::Result<bool>
    where
        F: FnOnce() -> io::Result<String>,
    {
        let previous = self.entries.get(&path);
        if previous.is_some_and(|e| e.stamp == stamp) {
            return Ok(false);
        }
        let digest = digest()?;
        let changed = previous.and_then(|e| e.digest.as_deref()) != Some(digest.as_str());
        self.entries.insert(path, TrackedEntry::new(stamp, Some(digest)));
        Ok(changed)
    }

    pub fn insert(&mut self, path: RelPath, entry: TrackedEntry) {
        self.entries.insert(path, entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, &TrackedEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(RelPath, TrackedEntry)> for TrackedCache {
    fn from_iter<I: IntoIterator<Item = (RelPath, TrackedEntry)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl FromIterator<(RelPath, Timestamp)> for TrackedCache {
    fn from_iter<I: IntoIterator<Item = (RelPath, Timestamp)>>(iter: I) -> Self {
        iter.into_iter().map(|(p, stamp)| (p, TrackedEntry::new(stamp, None))).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BibBackend {
    Bibtex,
    Biber,
}

impl BibBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bibtex" => Some(Self::Bibtex),
            "biber" => Some(Self::Biber),
            _ => None,
        }
    }

    pub fn runner_id(&self) -> &'static str {
        match self {
            Self::Bibtex => "bibtex",
            Self::Biber => "biber",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BibConfig {
    pub biblatex_mode: bool,
    pub backend: Option<BibBackend>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Running,
    Converged,
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleState {
    pub pass_count: u32,
    pub max_passes: u32,
    pub done: bool,
}

impl CycleState {
    pub fn new(max_passes: u32) -> Self {
        Self { pass_count: 0, max_passes, done: true }
    }

    pub fn is_maxed_out(&self) -> bool {
        self.pass_count >= self.max_passes
    }

    pub fn phase(&self) -> CyclePhase {
        if self.is_maxed_out() {
            CyclePhase::Exhausted
        } else if self.done {
            CyclePhase::Converged
        } else {
            CyclePhase::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn content(s: &str) -> impl FnOnce() -> io::Result<String> + '_ {
        move || Ok(s.to_string())
    }

    #[test]
    fn merge_reports_new_and_changed_entries() {
        let mut cache = TrackedCache::new();
        let p = RelPath::new("doc.aux");
        assert!(cache.merge(p.clone(), Timestamp(1), content("a")).unwrap());
        assert!(!cache.merge(p.clone(), Timestamp(1), content("b")).unwrap());
        assert!(cache.merge(p.clone(), Timestamp(2), content("b")).unwrap());
        assert_eq!(cache.stamp(&p), Some(Timestamp(2)));
    }

    #[test]
    fn rewrite_with_same_content_only_refreshes_stamp() {
        let mut cache = TrackedCache::new();
        let p = RelPath::new("doc.toc");
        cache.merge(p.clone(), Timestamp(1), content("toc")).unwrap();
        assert!(!cache.merge(p.clone(), Timestamp(2), content("toc")).unwrap());
        assert_eq!(cache.stamp(&p), Some(Timestamp(2)));
    }

    #[test]
    fn failed_digest_leaves_entry_untouched() {
        let mut cache: TrackedCache = [(RelPath::new("doc.aux"), Timestamp(1))].into_iter().collect();
        let err = cache.merge(RelPath::new("doc.aux"), Timestamp(2), || Err(io::Error::other("locked")));
        assert!(err.is_err());
        assert_eq!(cache.get(&RelPath::new("doc.aux")), Some(&TrackedEntry::new(Timestamp(1), None)));
    }

    #[test]
    fn cache_serializes_as_plain_map() {
        let cache: TrackedCache = [(RelPath::new("a/doc.aux"), Timestamp(7))].into_iter().collect();
        let json = serde_json::to_string(&cache).unwrap();
        assert_eq!(json, r#"{"a/doc.aux":{"stamp":7}}"#);
        let back: TrackedCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }

    #[test]
    fn snapshot_without_and_with_leave_original_untouched() {
        let snap: Snapshot = [(RelPath::new("a"), Timestamp(1)), (RelPath::new("b"), Timestamp(2))].into_iter().collect();
        let smaller = snap.without([&RelPath::new("a")]);
        let bigger = snap.with([(RelPath::new("c"), Timestamp(3))]);
        assert_eq!(snap.len(), 2);
        assert_eq!(smaller.len(), 1);
        assert_eq!(bigger.get(&RelPath::new("c")), Some(Timestamp(3)));
    }

    #[test]
    fn timestamps_follow_system_time_order() {
        let a = Timestamp::from_system_time(UNIX_EPOCH + Duration::from_secs(10));
        let b = Timestamp::from_system_time(UNIX_EPOCH + Duration::from_secs(11));
        assert!(a < b);
    }

    #[test]
    fn timestamps_saturate_at_both_ends() {
        let far = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Timestamp::from_system_time(UNIX_EPOCH - Duration::from_secs(1)), Timestamp(-1_000_000_000));
        if let Some(late) = UNIX_EPOCH.checked_add(far) {
            assert_eq!(Timestamp::from_system_time(late), Timestamp(i64::MAX));
        }
        if let Some(early) = UNIX_EPOCH.checked_sub(far) {
            assert_eq!(Timestamp::from_system_time(early), Timestamp(i64::MIN));
        }
    }

    #[test]
    fn cycle_phase_transitions() {
        let mut st = CycleState::new(2);
        assert_eq!(st.phase(), CyclePhase::Converged);
        st.done = false;
        assert_eq!(st.phase(), CyclePhase::Running);
        st.pass_count = 2;
        assert_eq!(st.phase(), CyclePhase::Exhausted);
    }

    #[test]
    fn backend_parse_is_case_insensitive() {
        assert_eq!(BibBackend::parse("Biber"), Some(BibBackend::Biber));
        assert_eq!(BibBackend::parse("unknown"), None);
    }
}
