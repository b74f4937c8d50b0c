use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sha2::{Digest, Sha256};
use texbuild_core::{is_project_file, CancelToken, Error, RelPath, Result, Snapshot, Timestamp};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Source of directory snapshots and single-file timestamps.
pub trait Scanner {
    /// A missing container yields an empty snapshot.
    fn scan(&self, container: &RelPath, cancel: &CancelToken) -> Result<Snapshot>;

    fn stamp(&self, path: &RelPath) -> Option<Timestamp>;

    fn digest(&self, path: &RelPath) -> io::Result<String>;
}

#[derive(Clone, Debug, Default)]
pub struct ScanFilter {
    pub excluded: Vec<RelPath>,
}

impl ScanFilter {
    pub fn new(excluded: Vec<RelPath>) -> Self {
        Self { excluded }
    }

    pub fn is_excluded_dir(&self, dir: &RelPath) -> bool {
        self.excluded.iter().any(|e| !e.is_root() && e == dir)
    }

    fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }

    pub fn admits(&self, container: &RelPath, file: &RelPath) -> bool {
        if !file.is_within(container) || is_project_file(file.file_name()) {
            return false;
        }
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == *container || d.is_root() {
                break;
            }
            if Self::is_hidden(d.file_name()) || self.is_excluded_dir(&d) {
                return false;
            }
            dir = d.parent();
        }
        !Self::is_hidden(file.file_name())
    }
}

#[derive(Clone, Debug)]
pub struct FsScanner {
    root: PathBuf,
    filter: ScanFilter,
}

impl FsScanner {
    pub fn new(root: PathBuf, excluded: Vec<RelPath>) -> Self {
        Self { root, filter: ScanFilter::new(excluded) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Scanner for FsScanner {
    fn scan(&self, container: &RelPath, cancel: &CancelToken) -> Result<Snapshot> {
        let dir = container.to_path(&self.root);
        if !dir.is_dir() {
            return Ok(Snapshot::default());
        }
        let mut files = BTreeMap::new();
        let walker = WalkDir::new(&dir).min_depth(1).follow_links(false).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            if ScanFilter::is_hidden(&name) {
                return false;
            }
            if e.file_type().is_dir() {
                return RelPath::from_path(&self.root, e.path()).map_or(false, |rel| !self.filter.is_excluded_dir(&rel));
            }
            true
        });
        for entry in walker {
            cancel.check()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let source = e.into_io_error().unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    return Err(Error::Scan { path: dir, source });
                }
                Err(e) => {
                    debug!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_project_file(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let Some(rel) = RelPath::from_path(&self.root, entry.path()) else {
                continue;
            };
            match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
                Ok(modified) => {
                    files.insert(rel, Timestamp::from_system_time(modified));
                }
                Err(e) => debug!("skipping {}: {e}", rel),
            }
        }
        trace!("scanned {} files below {}", files.len(), dir.display());
        Ok(Snapshot::new(files))
    }

    fn stamp(&self, path: &RelPath) -> Option<Timestamp> {
        let modified = std::fs::metadata(path.to_path(&self.root)).and_then(|m| m.modified()).ok()?;
        Some(Timestamp::from_system_time(modified))
    }

    fn digest(&self, path: &RelPath) -> io::Result<String> {
        let bytes = std::fs::read(path.to_path(&self.root))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Scanner over an in-memory file table, for tests. Clones share the same table.
#[derive(Clone, Debug, Default)]
pub struct MemoryScanner {
    files: Rc<RefCell<BTreeMap<RelPath, (Timestamp, String)>>>,
    unreadable: Rc<RefCell<BTreeSet<RelPath>>>,
    filter: ScanFilter,
}

impl MemoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excluded(excluded: Vec<RelPath>) -> Self {
        Self { filter: ScanFilter::new(excluded), ..Self::default() }
    }

    /// Each new stamp also means new content.
    pub fn touch(&self, path: &str, stamp: i64) {
        self.write(path, stamp, &format!("v{stamp}"));
    }

    pub fn write(&self, path: &str, stamp: i64, content: &str) {
        self.files.borrow_mut().insert(RelPath::new(path), (Timestamp(stamp), content.to_string()));
    }

    pub fn remove(&self, path: &str) {
        self.files.borrow_mut().remove(&RelPath::new(path));
    }

    /// Makes reading `path` fail until [`MemoryScanner::set_readable`] is called. The file still
    /// shows up in scans.
    pub fn set_unreadable(&self, path: &str) {
        self.unreadable.borrow_mut().insert(RelPath::new(path));
    }

    pub fn set_readable(&self, path: &str) {
        self.unreadable.borrow_mut().remove(&RelPath::new(path));
    }
}

impl Scanner for MemoryScanner {
    fn scan(&self, container: &RelPath, cancel: &CancelToken) -> Result<Snapshot> {
        let mut files = BTreeMap::new();
        for (path, (stamp, _)) in self.files.borrow().iter() {
            cancel.check()?;
            if self.filter.admits(container, path) {
                files.insert(path.clone(), *stamp);
            }
        }
        Ok(Snapshot::new(files))
    }

    fn stamp(&self, path: &RelPath) -> Option<Timestamp> {
        self.files.borrow().get(path).map(|(stamp, _)| *stamp)
    }

    fn digest(&self, path: &RelPath) -> io::Result<String> {
        if self.unreadable.borrow().contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("{path} is locked")));
        }
        match self.files.borrow().get(path) {
            Some((_, content)) => Ok(hex::encode(Sha256::digest(content.as_bytes()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("{path} does not exist"))),
        }
    }
}
