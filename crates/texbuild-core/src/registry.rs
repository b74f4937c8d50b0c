use crate::{RunnerDescriptor, RunnerKind};

#[derive(Clone, Debug, Default)]
pub struct RunnerRegistry {
    runners: Vec<RunnerDescriptor>,
}

impl RunnerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// latex, pdflatex, bibtex, biber, makeindex and the nomenclature variant of makeindex.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(RunnerDescriptor::new("latex", RunnerKind::Latex, "tex", "dvi"));
        reg.register(RunnerDescriptor::new("pdflatex", RunnerKind::PdfLatex, "tex", "pdf"));
        reg.register(RunnerDescriptor::new("bibtex", RunnerKind::Bibtex, "bib", "aux"));
        reg.register(RunnerDescriptor::new("biber", RunnerKind::Biber, "bcf", "bbl"));
        reg.register(RunnerDescriptor::new("makeindex", RunnerKind::MakeIndex, "idx", "ind"));
        reg.register(RunnerDescriptor::new("makeindex-nomencl", RunnerKind::MakeIndexNomencl, "nlo", "nls"));
        reg
    }

    pub fn register(&mut self, runner: RunnerDescriptor) {
        match self.runners.iter_mut().find(|r| r.id == runner.id) {
            Some(slot) => *slot = runner,
            None => self.runners.push(runner),
        }
    }

    pub fn get(&self, id: &str) -> Option<&RunnerDescriptor> {
        self.runners.iter().find(|r| r.id.as_str() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RunnerDescriptor> {
        self.runners.iter_mut().find(|r| r.id.as_str() == id)
    }

    /// First registered runner reading `input_ext` (and producing `output_ext`, when given).
    pub fn find(&self, input_ext: &str, output_ext: Option<&str>) -> Option<&RunnerDescriptor> {
        self.runners.iter().find(|r| r.accepts(input_ext, output_ext))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunnerDescriptor> {
        self.runners.iter()
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}
