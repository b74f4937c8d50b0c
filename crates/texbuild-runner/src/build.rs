use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Serialize;
use texbuild_core::{BuildId, CancelToken, RelPath, RunnerDescriptor, RunnerId, RunnerRegistry, SessionContext};
use texbuild_cycle::BuildCycle;
use texbuild_storage::CacheStore;
use texbuild_tracker::{FileTracker, FsScanner};
use tracing::{info, info_span, warn};

use crate::invoke::ToolInvoker;
use crate::outputs::{move_outputs, relocate};
use crate::signals::collect_core_signals;
use crate::Config;

/// What one build did.
#[derive(Clone, Debug, Serialize)]
pub struct BuildReport {
    pub build_id: BuildId,
    /// Core passes run.
    pub passes: u32,
    /// Auxiliary runners, in the order they ran.
    pub runners_run: Vec<RunnerId>,
    /// True when the pass limit ended the build.
    pub maxed_out: bool,
    /// Tracked files that changed since the previous build.
    pub initial_changes: Vec<RelPath>,
    /// Outputs placed in the output directory.
    pub outputs: Vec<RelPath>,
}

/// Builds one project: runs the core tool and the auxiliary runners until the build cycle is done,
/// then puts temporary files and outputs where they belong.
///
/// Keeps the tracker and the session signals between builds, so a second `run` only reacts to
/// what changed since the first.
pub struct BuildLoop {
    root: PathBuf,
    cfg: Config,
    registry: RunnerRegistry,
    invoker: Box<dyn ToolInvoker>,
    tracker: FileTracker,
    session: SessionContext,
}

impl BuildLoop {
    pub fn new(root: PathBuf, cfg: Config, invoker: Box<dyn ToolInvoker>, store: Box<dyn CacheStore>) -> Self {
        let scanner = FsScanner::new(root.clone(), cfg.excluded_dirs());
        let tracker = FileTracker::new(cfg.project_id(), Box::new(scanner), store, cfg.temp_dir());
        let registry = cfg.registry();
        let session = cfg.initial_session();
        Self { root, cfg, registry, invoker, tracker, session }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn tracker(&self) -> &FileTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut FileTracker {
        &mut self.tracker
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn run(&mut self, cancel: &CancelToken) -> Result<BuildReport> {
        let build_id = BuildId::new();
        let span = info_span!("build", id = %build_id);
        let _enter = span.enter();

        let Self { root, cfg, registry, invoker, tracker, session } = self;
        let root = root.as_path();
        let source = cfg.main_source();
        let source_dir = cfg.source_dir();
        let core = registry
            .get(&cfg.build.core_runner)
            .cloned()
            .ok_or_else(|| anyhow!("unknown core runner {}", cfg.build.core_runner))?;
        info!("building {} with {}", source, core.id);
        cancel.check()?;

        tracker.init_snapshots(&source_dir, cancel)?;
        if let Some(temp_dir) = cfg.temp_dir() {
            let moved = relocate(root, &tracker.temp_folder_names(), &temp_dir, &source_dir)?;
            tracker.set_moved_files(&moved);
        }

        let mut report = BuildReport {
            build_id: build_id.clone(),
            passes: 0,
            runners_run: Vec::new(),
            maxed_out: false,
            initial_changes: Vec::new(),
            outputs: Vec::new(),
        };

        let mut cycle = BuildCycle::new(tracker, registry, session, cfg.cycle_settings(), source.clone(), cancel.clone());
        let changes = cycle.init_file_tracking()?;
        if changes.iter().any(|p| p.extension() == Some("bib")) {
            cycle.session_mut().bib_files_changed = true;
        }
        report.initial_changes = changes.into_iter().collect();

        core_pass(root, &**invoker, &core, &source, &mut cycle, cancel)?;
        cycle.check_initial_output()?;
        while !cycle.is_maxed_out() {
            let mut ran = false;
            while let Some(runner) = cycle.next_runner() {
                cancel.check()?;
                run_tool(&**invoker, &runner, &source)?;
                report.runners_run.push(runner.id.clone());
                cycle.check_runner_output()?;
                ran = true;
            }
            if cycle.is_done() && !ran {
                break;
            }
            core_pass(root, &**invoker, &core, &source, &mut cycle, cancel)?;
            cycle.check_output()?;
        }

        let state = cycle.state();
        report.passes = state.pass_count;
        report.maxed_out = state.is_maxed_out();
        cycle.save_file_tracking()?;
        drop(cycle);
        if report.maxed_out {
            warn!("stopped after {} passes; references may be unresolved", report.passes);
        }

        let format = cfg.build.output_format.as_str();
        if let Some(temp_dir) = cfg.temp_dir() {
            let back = tracker.updated_temp_names(&source_dir, &cfg.build.temp_exts, format, cancel)?;
            relocate(root, &back, &source_dir, &temp_dir)?;
        }
        if let Some(output_dir) = cfg.output_dir() {
            let base = source.file_name().strip_suffix(".tex").unwrap_or(source.file_name());
            let outputs = tracker.output_names(&source_dir, base, &cfg.build.derived_exts, format, cancel)?;
            report.outputs = move_outputs(root, &outputs, &output_dir)?;
        }
        if cfg.temp_dir().is_some() {
            tracker.refresh_temp_folder_names(cancel)?;
        }

        info!(
            "build finished after {} passes, {} runner invocations",
            report.passes,
            report.runners_run.len()
        );
        Ok(report)
    }
}

fn run_tool(invoker: &dyn ToolInvoker, runner: &RunnerDescriptor, source: &RelPath) -> Result<()> {
    let run = invoker.invoke(runner, source)?;
    if !run.success {
        warn!("{} exited with {:?}", runner.id, run.code);
    }
    Ok(())
}

fn core_pass(
    root: &Path,
    invoker: &dyn ToolInvoker,
    core: &RunnerDescriptor,
    source: &RelPath,
    cycle: &mut BuildCycle<'_>,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;
    run_tool(invoker, core, source)?;
    collect_core_signals(root, source, cycle.session_mut())
}
