use std::collections::{BTreeMap, BTreeSet};

use texbuild_core::{
    has_matching_ext, is_temp_file, matching_ext, CancelToken, Error, ProjectId, RelPath, Result, Snapshot, Timestamp,
    TrackedCache,
};
use texbuild_storage::CacheStore;
use tracing::{debug, info};

use crate::scan::Scanner;

/// Keeps track of build-generated files of one project: snapshots of the temp directory, of the
/// files moved in from it and of the build directory, plus the persisted [`TrackedCache`].
///
/// Operations that can fail or be cancelled commit nothing until they succeed.
pub struct FileTracker {
    project: ProjectId,
    scanner: Box<dyn Scanner>,
    store: Box<dyn CacheStore>,
    temp_dir: Option<RelPath>,
    temp_names: Option<Snapshot>,
    moved_names: Option<Snapshot>,
    build_names: Option<Snapshot>,
    /// Moved files not yet reported by a change check.
    unreported_moves: BTreeSet<RelPath>,
    cache: TrackedCache,
}

impl FileTracker {
    pub fn new(project: ProjectId, scanner: Box<dyn Scanner>, store: Box<dyn CacheStore>, temp_dir: Option<RelPath>) -> Self {
        Self {
            project,
            scanner,
            store,
            temp_dir,
            temp_names: None,
            moved_names: None,
            build_names: None,
            unreported_moves: BTreeSet::new(),
            cache: TrackedCache::new(),
        }
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn scanner(&self) -> &dyn Scanner {
        self.scanner.as_ref()
    }

    pub fn cache(&self) -> &TrackedCache {
        &self.cache
    }

    pub fn is_initial(&self) -> bool {
        self.temp_names.is_none() || self.build_names.is_none()
    }

    pub fn build_snapshot(&self) -> Option<&Snapshot> {
        self.build_names.as_ref()
    }

    pub fn moved_snapshot(&self) -> Option<&Snapshot> {
        self.moved_names.as_ref()
    }

    pub fn temp_snapshot(&self) -> Option<&Snapshot> {
        self.temp_names.as_ref()
    }

    pub fn temp_folder_names(&self) -> BTreeSet<RelPath> {
        self.temp_names.iter().flat_map(|s| s.paths().cloned()).collect()
    }

    fn scan_temp_dir(&self, cancel: &CancelToken) -> Result<Snapshot> {
        match &self.temp_dir {
            Some(dir) => self.scanner.scan(dir, cancel),
            None => Ok(Snapshot::default()),
        }
    }

    pub fn refresh_temp_folder_names(&mut self, cancel: &CancelToken) -> Result<BTreeSet<RelPath>> {
        let snapshot = self.scan_temp_dir(cancel)?;
        let names = snapshot.paths().cloned().collect();
        self.temp_names = Some(snapshot);
        Ok(names)
    }

    /// Snapshots the temp directory and `container` (the build directory) and forgets earlier moves.
    pub fn init_snapshots(&mut self, container: &RelPath, cancel: &CancelToken) -> Result<()> {
        let temp = self.scan_temp_dir(cancel)?;
        let build = self.scanner.scan(container, cancel)?;
        debug!("snapshots taken: {} temp files, {} files in {}", temp.len(), build.len(), container);
        self.temp_names = Some(temp);
        self.build_names = Some(build);
        self.moved_names = Some(Snapshot::default());
        self.unreported_moves.clear();
        Ok(())
    }

    /// Records temp files moved (old path to new path) into the build directory. They keep the
    /// timestamp of the temp snapshot.
    pub fn set_moved_files(&mut self, moved: &BTreeMap<RelPath, RelPath>) {
        let (Some(temp), Some(moved_names)) = (&self.temp_names, &self.moved_names) else {
            return;
        };
        let mut carried = Vec::new();
        for (old, new) in moved {
            if let Some(stamp) = temp.get(old) {
                carried.push((old.clone(), new.clone(), stamp));
            }
        }
        let temp = temp.without(carried.iter().map(|(old, _, _)| old));
        let moved_names = moved_names.with(carried.iter().map(|(_, new, stamp)| (new.clone(), *stamp)));
        self.unreported_moves.extend(carried.into_iter().map(|(_, new, _)| new));
        self.temp_names = Some(temp);
        self.moved_names = Some(moved_names);
    }

    pub fn moved_stamp(&self, path: &RelPath) -> Option<Timestamp> {
        self.moved_names.as_ref().and_then(|s| s.get(path))
    }

    fn require_snapshots(&self) -> Result<(&Snapshot, &Snapshot)> {
        match (&self.build_names, &self.moved_names) {
            (Some(build), Some(moved)) if !self.is_initial() => Ok((build, moved)),
            _ => Err(Error::Uninitialized),
        }
    }

    /// Temporary files in `container` that were moved in before the build, or that are new or
    /// modified compared to the build directory snapshot.
    pub fn updated_temp_names<S: AsRef<str>>(
        &self,
        container: &RelPath,
        temp_exts: &[S],
        format: &str,
        cancel: &CancelToken,
    ) -> Result<BTreeSet<RelPath>> {
        let (build, moved) = self.require_snapshots()?;
        let current = self.scanner.scan(container, cancel)?;
        let mut names = BTreeSet::new();
        for (path, stamp) in current.iter() {
            let modified = build.get(path) != Some(stamp);
            if moved.contains(path) || (is_temp_file(path.file_name(), temp_exts, format) && modified) {
                names.insert(path.clone());
            }
        }
        Ok(names)
    }

    /// Loads the persisted cache and merges tracked files of the build directory and all moved
    /// files into it. Returns files that changed since the cache was saved; moved files are always
    /// included.
    pub fn init_file_cache<S: AsRef<str>>(
        &mut self,
        temp_exts: &[S],
        add_exts: &[S],
        cancel: &CancelToken,
    ) -> Result<BTreeSet<RelPath>> {
        let (build, moved) = self.require_snapshots()?;
        cancel.check()?;
        let mut cache = self.store.load(&self.project)?;
        let prior = cache.len();
        let mut changed = BTreeSet::new();
        for (path, stamp) in build.iter() {
            cancel.check()?;
            let name = path.file_name();
            if !has_matching_ext(name, temp_exts) && !has_matching_ext(name, add_exts) {
                continue;
            }
            match cache.merge(path.clone(), stamp, || self.scanner.digest(path)) {
                Ok(true) => {
                    changed.insert(path.clone());
                }
                Ok(false) => {}
                Err(e) => debug!("cannot read {path}, not tracking it yet: {e}"),
            }
        }
        for (path, stamp) in moved.iter() {
            cancel.check()?;
            match cache.merge(path.clone(), stamp, || self.scanner.digest(path)) {
                Ok(_) => {
                    changed.insert(path.clone());
                }
                Err(e) => debug!("cannot read moved file {path}: {e}"),
            }
        }
        info!("file cache of {} restored with {} entries, {} changed since last build", self.project, prior, changed.len());
        self.unreported_moves.retain(|p| !changed.contains(p));
        self.cache = cache;
        Ok(changed)
    }

    pub fn save_file_cache(&self) -> Result<()> {
        self.store.save(&self.project, &self.cache)?;
        debug!("file cache of {} saved ({} entries)", self.project, self.cache.len());
        Ok(())
    }

    pub fn clear_file_cache(&mut self) -> Result<()> {
        self.store.clear(&self.project)?;
        self.cache.clear();
        Ok(())
    }

    /// Rescans `container` and returns tracked files that are new or changed compared to the
    /// cache, updating the cache on the way. A moved file is reported the first time it is seen
    /// here, whatever its state. Files that cannot be read are left out until a later scan.
    pub fn update_changed_files<S: AsRef<str>>(
        &mut self,
        container: &RelPath,
        temp_exts: &[S],
        add_exts: &[S],
        cancel: &CancelToken,
    ) -> Result<BTreeSet<RelPath>> {
        let current = self.scanner.scan(container, cancel)?;
        let mut cache = self.cache.clone();
        let mut changed = BTreeSet::new();
        for (path, stamp) in current.iter() {
            cancel.check()?;
            let name = path.file_name();
            let first_seen_after_move = self.unreported_moves.contains(path);
            if !first_seen_after_move && !has_matching_ext(name, temp_exts) && !has_matching_ext(name, add_exts) {
                continue;
            }
            match cache.merge(path.clone(), stamp, || self.scanner.digest(path)) {
                Ok(modified) => {
                    if modified || first_seen_after_move {
                        changed.insert(path.clone());
                    }
                }
                // TODO: report files that stay unreadable across whole builds instead of skipping them forever
                Err(e) => debug!("cannot read {path}, leaving it for the next scan: {e}"),
            }
        }
        self.cache = cache;
        self.unreported_moves.retain(|p| !changed.contains(p));
        debug!("{} changed files in {}", changed.len(), container);
        Ok(changed)
    }

    pub fn clear_snapshots(&mut self) {
        self.temp_names = None;
        self.moved_names = None;
        self.build_names = None;
        self.unreported_moves.clear();
    }

    /// Outputs of `source_base` directly inside `container`: the main output `<base>.<format>` and
    /// `<base><ext>` for each derived extension. Values are the matched extension, with dot.
    pub fn output_names<S: AsRef<str>>(
        &self,
        container: &RelPath,
        source_base: &str,
        derived_exts: &[S],
        format: &str,
        cancel: &CancelToken,
    ) -> Result<BTreeMap<RelPath, String>> {
        let dot_format = format!(".{format}");
        let current_output = format!("{source_base}{dot_format}");
        let current = self.scanner.scan(container, cancel)?;
        let mut names = BTreeMap::new();
        for path in current.paths() {
            if path.parent().as_ref() != Some(container) {
                continue;
            }
            let name = path.file_name();
            if name == current_output {
                names.insert(path.clone(), dot_format.clone());
            } else if let Some(ext) = matching_ext(name, derived_exts) {
                if name.strip_suffix(ext) == Some(source_base) {
                    names.insert(path.clone(), ext.to_string());
                }
            }
        }
        Ok(names)
    }
}
