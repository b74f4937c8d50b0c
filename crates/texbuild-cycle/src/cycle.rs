use std::collections::BTreeSet;

use texbuild_core::{
    BibConfig, CancelToken, CyclePhase, CycleState, RelPath, Result, RunnerDescriptor, RunnerId, RunnerRegistry,
    SessionContext, SessionFlag,
};
use texbuild_queue::{PendingQueue, Placement};
use texbuild_tracker::FileTracker;
use tracing::{debug, info, warn};

use crate::bib::{detect_bib_config, resolve_bib_runner, session_bib_config};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleSettings {
    pub max_passes: u32,
    pub temp_exts: Vec<String>,
    pub add_exts: Vec<String>,
    pub output_format: String,
}

impl Default for CycleSettings {
    fn default() -> Self {
        let exts = |list: &[&str]| -> Vec<String> { list.iter().map(|e| e.to_string()).collect() };
        Self {
            max_passes: 10,
            temp_exts: exts(&[
                ".aux", ".bbl", ".bcf", ".blg", ".fls", ".idx", ".ilg", ".ind", ".lof", ".log", ".lot", ".nlo",
                ".nls", ".out", ".run.xml",
            ]),
            add_exts: exts(&[".toc", ".bib"]),
            output_format: "pdf".to_string(),
        }
    }
}

/// Decides after every pass whether the build continues and which auxiliary runners go first.
///
/// Lives for one build. The tracker and the session signals are lent to it for that time; the
/// pass counter, the pending queue and the bibliography setup are its own.
pub struct BuildCycle<'a> {
    tracker: &'a mut FileTracker,
    registry: &'a RunnerRegistry,
    session: &'a mut SessionContext,
    settings: CycleSettings,
    source: RelPath,
    container: RelPath,
    queue: PendingQueue,
    state: CycleState,
    bib: BibConfig,
    cancel: CancelToken,
}

impl<'a> BuildCycle<'a> {
    pub fn new(
        tracker: &'a mut FileTracker,
        registry: &'a RunnerRegistry,
        session: &'a mut SessionContext,
        settings: CycleSettings,
        source: RelPath,
        cancel: CancelToken,
    ) -> Self {
        let container = source.parent().unwrap_or_else(|| RelPath::new(""));
        let bib = session_bib_config(session);
        let state = CycleState::new(settings.max_passes);
        Self { tracker, registry, session, settings, source, container, queue: PendingQueue::new(), state, bib, cancel }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn phase(&self) -> CyclePhase {
        self.state.phase()
    }

    pub fn bib_config(&self) -> BibConfig {
        self.bib
    }

    pub fn session(&self) -> &SessionContext {
        &*self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut *self.session
    }

    pub fn pending(&self) -> impl Iterator<Item = &RunnerId> {
        self.queue.ids()
    }

    /// Restores the persisted cache and returns files changed since the last build.
    pub fn init_file_tracking(&mut self) -> Result<BTreeSet<RelPath>> {
        let changes = self.tracker.init_file_cache(&self.settings.temp_exts, &self.settings.add_exts, &self.cancel)?;
        self.check_output_files(&changes, Placement::Back);
        Ok(changes)
    }

    pub fn save_file_tracking(&self) -> Result<()> {
        self.tracker.save_file_cache()
    }

    pub fn next_runner(&mut self) -> Option<RunnerDescriptor> {
        self.queue.dequeue()
    }

    pub fn check_output(&mut self) -> Result<()> {
        self.state.pass_count += 1;
        if self.state.is_maxed_out() {
            self.state.done = true;
            warn!("giving up after {} passes", self.state.pass_count);
            return Ok(());
        }
        self.state.done = self.queue.is_empty();
        if self.session.take_latex_rerun() {
            debug!("core tool requested another pass");
            self.state.done = false;
        }
        let changed = self.update_changed_files()?;
        self.check_output_files(&changed, Placement::Back);
        info!("pass {} evaluated: {:?}, {} runners pending", self.state.pass_count, self.phase(), self.queue.len());
        Ok(())
    }

    /// [`BuildCycle::check_output`] for the first core pass, which additionally settles the
    /// bibliography setup and handles pending bibliography signals.
    pub fn check_initial_output(&mut self) -> Result<()> {
        self.check_output()?;
        if self.state.is_maxed_out() {
            return Ok(());
        }
        if self.session.packages.is_some() {
            self.bib = detect_bib_config(&*self.session, &self.source, self.tracker.scanner());
        }
        self.check_bibtex_variables();
        Ok(())
    }

    pub fn check_runner_output(&mut self) -> Result<()> {
        let changed = self.update_changed_files()?;
        self.check_output_files(&changed, Placement::Front);
        Ok(())
    }

    /// Schedules the bibliography runner if the session asks for one.
    ///
    /// Meant to run once per build: undefined citations raise the signal on every pass, so
    /// re-arming it would loop until the pass limit.
    pub fn check_bibtex_variables(&mut self) {
        if !self.session.bibtex_rerun && !self.session.bib_files_changed {
            return;
        }
        let runner = resolve_bib_runner(&self.bib, self.registry).cloned();
        self.session.clear(SessionFlag::BibtexRerun);
        self.session.clear(SessionFlag::BibFilesChanged);
        match runner {
            Some(runner) => {
                debug!("bibliography needs processing, scheduling {}", runner.id);
                self.queue.enqueue(runner, Placement::Front);
                self.state.done = false;
            }
            None => warn!("bibliography needs processing but no runner is available for {:?}", self.bib),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.done
    }

    pub fn is_maxed_out(&self) -> bool {
        self.state.is_maxed_out()
    }

    fn update_changed_files(&mut self) -> Result<BTreeSet<RelPath>> {
        self.tracker.update_changed_files(&self.container, &self.settings.temp_exts, &self.settings.add_exts, &self.cancel)
    }

    fn check_output_files(&mut self, changed: &BTreeSet<RelPath>, placement: Placement) {
        for path in changed {
            let Some(ext) = path.extension().map(str::to_ascii_lowercase) else {
                continue;
            };
            if ext.is_empty() || ext == "tex" || ext == "bib" {
                continue;
            }
            if let Some(runner) = self.registry.find(&ext, None) {
                if self.queue.enqueue(runner.clone(), placement) {
                    debug!("{} changed, scheduling {} ({:?})", path, runner.id, placement);
                }
            }
            if self.session.is_core_input(path) {
                debug!("{} is read by the core tool, another pass is needed", path);
                self.state.done = false;
            }
        }
    }
}
