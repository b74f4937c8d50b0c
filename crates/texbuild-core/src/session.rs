use std::collections::{BTreeSet, HashSet};

use crate::{BibBackend, RelPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionFlag {
    LatexRerun,
    BibtexRerun,
    BibFilesChanged,
    Packages,
    BiblatexMode,
    BiblatexBackend,
    CoreInputs,
    Citations,
}

/// Signals the tool-output layer raises and the build cycle reads and clears.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    pub latex_rerun: bool,
    pub bibtex_rerun: bool,
    pub bib_files_changed: bool,
    /// Packages the main document loads; `None` until the document was parsed.
    pub packages: Option<BTreeSet<String>>,
    pub biblatex_mode: bool,
    pub biblatex_backend: Option<BibBackend>,
    pub core_inputs: HashSet<RelPath>,
    /// Citation keys in the `.aux` after the last core run; `None` until one was read.
    pub citations: Option<BTreeSet<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, flag: SessionFlag) -> bool {
        match flag {
            SessionFlag::LatexRerun => self.latex_rerun,
            SessionFlag::BibtexRerun => self.bibtex_rerun,
            SessionFlag::BibFilesChanged => self.bib_files_changed,
            SessionFlag::Packages => self.packages.is_some(),
            SessionFlag::BiblatexMode => self.biblatex_mode,
            SessionFlag::BiblatexBackend => self.biblatex_backend.is_some(),
            SessionFlag::CoreInputs => !self.core_inputs.is_empty(),
            SessionFlag::Citations => self.citations.is_some(),
        }
    }

    pub fn clear(&mut self, flag: SessionFlag) {
        match flag {
            SessionFlag::LatexRerun => self.latex_rerun = false,
            SessionFlag::BibtexRerun => self.bibtex_rerun = false,
            SessionFlag::BibFilesChanged => self.bib_files_changed = false,
            SessionFlag::Packages => self.packages = None,
            SessionFlag::BiblatexMode => self.biblatex_mode = false,
            SessionFlag::BiblatexBackend => self.biblatex_backend = None,
            SessionFlag::CoreInputs => self.core_inputs.clear(),
            SessionFlag::Citations => self.citations = None,
        }
    }

    pub fn take_latex_rerun(&mut self) -> bool {
        std::mem::take(&mut self.latex_rerun)
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.as_ref().is_some_and(|p| p.contains(name))
    }

    pub fn is_core_input(&self, path: &RelPath) -> bool {
        self.core_inputs.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_latex_rerun_clears_flag() {
        let mut s = SessionContext::new();
        s.latex_rerun = true;
        assert!(s.take_latex_rerun());
        assert!(!s.take_latex_rerun());
    }

    #[test]
    fn clear_resets_each_flag() {
        let mut s = SessionContext::new();
        s.bibtex_rerun = true;
        s.bib_files_changed = true;
        s.packages = Some(["biblatex".to_string()].into_iter().collect());
        assert!(s.has_package("biblatex"));
        for flag in [SessionFlag::BibtexRerun, SessionFlag::BibFilesChanged, SessionFlag::Packages] {
            assert!(s.is_set(flag));
            s.clear(flag);
            assert!(!s.is_set(flag));
        }
        assert!(!s.has_package("biblatex"));
    }
}
