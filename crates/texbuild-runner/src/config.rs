use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use texbuild_core::{BibBackend, Error, ProjectId, RelPath, RunnerRegistry, SessionContext};
use texbuild_cycle::CycleSettings;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub build: BuildConfig,
    #[serde(default)]
    pub bibliography: BibliographyConfig,
    #[serde(default)]
    pub runners: BTreeMap<String, RunnerOverride>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    /// Main document, relative to the project root.
    pub main: String,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub temp_dir: Option<String>,
    #[serde(default = "default_cache_backend")]
    pub cache_backend: String, // "sqlite" | "json"
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildConfig {
    pub max_passes: u32,
    pub output_format: String,
    pub core_runner: String,
    pub temp_exts: Vec<String>,
    pub add_exts: Vec<String>,
    #[serde(default)]
    pub derived_exts: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BibliographyConfig {
    #[serde(default)]
    pub biblatex_mode: bool,
    #[serde(default)]
    pub backend: Option<String>, // "bibtex" | "biber"
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunnerOverride {
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

fn default_cache_backend() -> String {
    "sqlite".to_string()
}

fn default_cache_dir() -> String {
    "~/.texbuild/cache".to_string()
}

impl Config {
    pub fn default_for_repo(project_id: &str) -> Self {
        let settings = CycleSettings::default();
        Self {
            project: ProjectConfig {
                id: project_id.to_string(),
                main: "main.tex".to_string(),
                output_dir: None,
                temp_dir: Some("tmp".to_string()),
                cache_backend: default_cache_backend(),
                cache_dir: default_cache_dir(),
            },
            build: BuildConfig {
                max_passes: settings.max_passes,
                output_format: settings.output_format,
                core_runner: "pdflatex".to_string(),
                temp_exts: settings.temp_exts,
                add_exts: settings.add_exts,
                derived_exts: vec![".synctex.gz".to_string()],
            },
            bibliography: BibliographyConfig::default(),
            runners: BTreeMap::new(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse texbuild.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> texbuild_core::Result<()> {
        if self.build.max_passes == 0 {
            return Err(Error::Config("build.max_passes must be at least 1".into()));
        }
        if !self.project.main.ends_with(".tex") {
            return Err(Error::Config(format!("project.main must name a .tex file, got {}", self.project.main)));
        }
        if let Some(backend) = &self.bibliography.backend {
            if BibBackend::parse(backend).is_none() {
                return Err(Error::Config(format!("unknown bibliography backend {backend}")));
            }
        }
        if !matches!(self.project.cache_backend.as_str(), "sqlite" | "json") {
            return Err(Error::Config(format!("unknown cache backend {}", self.project.cache_backend)));
        }
        match self.registry().get(&self.build.core_runner) {
            Some(r) if r.core => Ok(()),
            Some(_) => Err(Error::Config(format!("{} is not a typesetting runner", self.build.core_runner))),
            None => Err(Error::Config(format!("unknown core runner {}", self.build.core_runner))),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        ProjectId::from_str(self.project.id.clone())
    }

    pub fn main_source(&self) -> RelPath {
        RelPath::new(self.project.main.as_str())
    }

    pub fn source_dir(&self) -> RelPath {
        self.main_source().parent().unwrap_or_else(|| RelPath::new(""))
    }

    pub fn temp_dir(&self) -> Option<RelPath> {
        self.project.temp_dir.as_deref().map(RelPath::new).filter(|p| !p.is_root())
    }

    pub fn output_dir(&self) -> Option<RelPath> {
        self.project.output_dir.as_deref().map(RelPath::new).filter(|p| !p.is_root())
    }

    /// Directories a scan never walks into.
    pub fn excluded_dirs(&self) -> Vec<RelPath> {
        self.temp_dir().into_iter().chain(self.output_dir()).collect()
    }

    /// Built-in runners with the `[runners.<id>]` overrides applied.
    pub fn registry(&self) -> RunnerRegistry {
        let mut reg = RunnerRegistry::builtin();
        for (id, ov) in &self.runners {
            if let Some(runner) = reg.get_mut(id) {
                if let Some(exe) = &ov.executable {
                    runner.executable = exe.clone();
                }
                if let Some(args) = &ov.args {
                    runner.args = args.clone();
                }
            }
        }
        reg
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            max_passes: self.build.max_passes,
            temp_exts: self.build.temp_exts.clone(),
            add_exts: self.build.add_exts.clone(),
            output_format: self.build.output_format.clone(),
        }
    }

    /// Session signals as configured, before any tool ran.
    pub fn initial_session(&self) -> SessionContext {
        let mut session = SessionContext::new();
        session.biblatex_mode = self.bibliography.biblatex_mode;
        session.biblatex_backend = self.bibliography.backend.as_deref().and_then(BibBackend::parse);
        session
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.project.cache_dir).to_string())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".texbuild").join("texbuild.toml")
    }

    pub fn db_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".texbuild").join("texbuild.db")
    }
}
