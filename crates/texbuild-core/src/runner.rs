use serde::{Deserialize, Serialize};

use crate::RunnerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Latex,
    PdfLatex,
    Bibtex,
    Biber,
    MakeIndex,
    MakeIndexNomencl,
    Custom,
}

/// A tool the build cycle can schedule, keyed by `id`.
///
/// `args` may contain `%input` (main source file name without extension) and `%fullinput`
/// (main source file name); the invoker substitutes them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    pub id: RunnerId,
    pub kind: RunnerKind,
    pub label: String,
    pub input_ext: String,
    pub output_ext: String,
    pub core: bool,
    pub executable: String,
    pub args: Vec<String>,
}

impl RunnerDescriptor {
    pub fn new(id: &str, kind: RunnerKind, input_ext: &str, output_ext: &str) -> Self {
        let core = matches!(kind, RunnerKind::Latex | RunnerKind::PdfLatex);
        let (executable, args) = default_command(kind, id);
        Self {
            id: RunnerId::from_str(id),
            kind,
            label: id.to_string(),
            input_ext: input_ext.to_ascii_lowercase(),
            output_ext: output_ext.to_ascii_lowercase(),
            core,
            executable,
            args,
        }
    }

    pub fn accepts(&self, input_ext: &str, output_ext: Option<&str>) -> bool {
        self.input_ext.eq_ignore_ascii_case(input_ext)
            && output_ext.map_or(true, |o| self.output_ext.eq_ignore_ascii_case(o))
    }
}

fn default_command(kind: RunnerKind, id: &str) -> (String, Vec<String>) {
    let args: &[&str] = match kind {
        RunnerKind::Latex | RunnerKind::PdfLatex => &["-interaction=nonstopmode", "-recorder", "%fullinput"],
        RunnerKind::Bibtex | RunnerKind::Biber => &["%input"],
        RunnerKind::MakeIndex => &["%input.idx"],
        RunnerKind::MakeIndexNomencl => &["%input.nlo", "-s", "nomencl.ist", "-o", "%input.nls"],
        RunnerKind::Custom => &["%input"],
    };
    let exe = match kind {
        RunnerKind::Latex => "latex",
        RunnerKind::PdfLatex => "pdflatex",
        RunnerKind::Bibtex => "bibtex",
        RunnerKind::Biber => "biber",
        RunnerKind::MakeIndex | RunnerKind::MakeIndexNomencl => "makeindex",
        RunnerKind::Custom => id,
    };
    (exe.to_string(), args.iter().map(|a| a.to_string()).collect())
}
