use std::path::{Path, PathBuf};

use anyhow::Result;
use texbuild_core::{CancelToken, TrackedCache};
use texbuild_storage::{CacheStore, FileCacheStore};
use texbuild_storage_sqlite::SqliteCacheStore;

use crate::build::{BuildLoop, BuildReport};
use crate::doctor::{doctor, ToolCheck};
use crate::invoke::ProcessInvoker;
use crate::Config;

/// A LaTeX project rooted at a directory with a `.texbuild/` config.
pub struct Project {
    pub root: PathBuf,
    pub cfg: Config,
}

fn default_project_id(root: &Path) -> &str {
    root.file_name().and_then(|s| s.to_str()).unwrap_or("project")
}

/// First `.tex` file directly in `root`, by name. Projects with several top-level documents should
/// set `project.main` explicitly.
fn guess_main(root: &Path) -> Option<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.ends_with(".tex"))
        .collect();
    names.sort();
    names.into_iter().next()
}

fn default_config(root: &Path) -> Config {
    let mut cfg = Config::default_for_repo(default_project_id(root));
    if let Some(main) = guess_main(root) {
        cfg.project.main = main;
    }
    cfg
}

impl Project {
    /// Loads `.texbuild/texbuild.toml`, writing a default one first if there is none.
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = default_config(&root);
            cfg.save_to(&cfg_path)?;
            cfg
        };
        Ok(Self { root, cfg })
    }

    pub fn init(root: &Path) -> Result<()> {
        std::fs::create_dir_all(root.join(".texbuild")).ok();
        let cfg_path = Config::config_path(root);
        if !cfg_path.exists() {
            default_config(root).save_to(&cfg_path)?;
        }
        // create db
        let _ = SqliteCacheStore::open(&Config::db_path(root))?;
        Ok(())
    }

    /// The file cache store selected by `project.cache_backend`.
    pub fn cache_store(&self) -> Result<Box<dyn CacheStore>> {
        match self.cfg.project.cache_backend.as_str() {
            "json" => Ok(Box::new(FileCacheStore::new(self.cfg.cache_dir()))),
            _ => Ok(Box::new(SqliteCacheStore::open(&Config::db_path(&self.root))?)),
        }
    }

    pub fn doctor(&self) -> Result<Vec<ToolCheck>> {
        doctor(&self.cfg)
    }

    /// A build loop that runs the configured tools as child processes.
    pub fn build_loop(&self) -> Result<BuildLoop> {
        let invoker = ProcessInvoker::new(self.root.clone());
        Ok(BuildLoop::new(self.root.clone(), self.cfg.clone(), Box::new(invoker), self.cache_store()?))
    }

    pub fn build(&self, max_passes: Option<u32>, cancel: &CancelToken) -> Result<BuildReport> {
        let mut project = Self { root: self.root.clone(), cfg: self.cfg.clone() };
        if let Some(n) = max_passes {
            project.cfg.build.max_passes = n;
            project.cfg.validate()?;
        }
        project.build_loop()?.run(cancel)
    }

    /// Tracked files as of the last saved build.
    pub fn tracked_files(&self) -> Result<TrackedCache> {
        self.cache_store()?.load(&self.cfg.project_id())
    }

    /// Forgets all tracked timestamps, so the next build treats every file as new.
    pub fn clean(&self) -> Result<()> {
        self.cache_store()?.clear(&self.cfg.project_id())
    }
}
