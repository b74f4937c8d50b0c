use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, ErrorCode};
use texbuild_core::{ProjectId, RelPath, Timestamp, TrackedCache, TrackedEntry};
use texbuild_storage::CacheStore;
use tracing::warn;

/// Tracked-file caches of any number of projects in one SQLite database.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("init tracked_files schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn load_rows(conn: &Connection, project: &ProjectId) -> rusqlite::Result<TrackedCache> {
        let mut stmt = conn.prepare("SELECT path, stamp, digest FROM tracked_files WHERE project_id = ?1")?;
        let rows = stmt.query_map([project.as_str()], |r| {
            let entry = TrackedEntry::new(Timestamp(r.get(1)?), r.get(2)?);
            Ok((RelPath::new(r.get::<_, String>(0)?), entry))
        })?;
        let mut entries = vec![];
        for row in rows {
            entries.push(row?);
        }
        Ok(entries.into_iter().collect())
    }
}

fn is_corruption(e: &rusqlite::Error) -> bool {
    matches!(e.sqlite_error_code(), Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase))
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, project: &ProjectId) -> Result<TrackedCache> {
        let conn = self.lock()?;
        match Self::load_rows(&conn, project) {
            Ok(cache) => Ok(cache),
            Err(e) if is_corruption(&e) => {
                warn!("discarding corrupt tracked_files for {}: {e}", project);
                Ok(TrackedCache::default())
            }
            Err(e) => Err(e).with_context(|| format!("load tracked files of {}", project)),
        }
    }

    fn save(&self, project: &ProjectId, cache: &TrackedCache) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tracked_files WHERE project_id = ?1", [project.as_str()])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO tracked_files(project_id, path, stamp, digest) VALUES (?1, ?2, ?3, ?4)")?;
            for (path, entry) in cache.iter() {
                stmt.execute(params![project.as_str(), path.as_str(), entry.stamp.0, entry.digest])?;
            }
        }
        tx.commit().with_context(|| format!("save tracked files of {}", project))?;
        Ok(())
    }

    fn clear(&self, project: &ProjectId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM tracked_files WHERE project_id = ?1", [project.as_str()])?;
        Ok(())
    }
}
