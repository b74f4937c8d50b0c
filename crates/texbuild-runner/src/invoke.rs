use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use texbuild_core::{RelPath, RunnerDescriptor};
use tracing::{debug, trace};

/// How one tool run ended. A failed run is still a finished run: typesetting tools exit non-zero on
/// document errors but leave usable output behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolRun {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
}

/// Starts build tools. Implementations block until the tool exits.
pub trait ToolInvoker {
    /// Runs `runner` on the main document `source`, in the document's directory.
    fn invoke(&self, runner: &RunnerDescriptor, source: &RelPath) -> Result<ToolRun>;
}

/// Replaces `%input` (file name without `.tex`) and `%fullinput` (file name) in `args`.
pub fn substitute_args(args: &[String], source: &RelPath) -> Vec<String> {
    let full = source.file_name();
    let base = full.strip_suffix(".tex").unwrap_or(full);
    args.iter().map(|a| a.replace("%fullinput", full).replace("%input", base)).collect()
}

/// Runs tools as child processes below `root`.
#[derive(Clone, Debug)]
pub struct ProcessInvoker {
    pub root: PathBuf,
}

impl ProcessInvoker {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ToolInvoker for ProcessInvoker {
    fn invoke(&self, runner: &RunnerDescriptor, source: &RelPath) -> Result<ToolRun> {
        let dir = source.parent().unwrap_or_else(|| RelPath::new("")).to_path(&self.root);
        let args = substitute_args(&runner.args, source);
        debug!("running {} {:?} in {}", runner.executable, args, dir.display());
        let out = Command::new(&runner.executable)
            .args(&args)
            .current_dir(&dir)
            .output()
            .with_context(|| format!("run {} {:?}", runner.executable, args))?;
        let stdout = String::from_utf8_lossy(&out.stdout).to_string();
        trace!("{} output:\n{}", runner.id, stdout);
        Ok(ToolRun { success: out.status.success(), code: out.status.code(), stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texbuild_core::RunnerKind;

    #[test]
    fn placeholders_are_replaced() {
        let args = vec!["-interaction=nonstopmode".to_string(), "%fullinput".to_string(), "%input.idx".to_string()];
        let out = substitute_args(&args, &RelPath::new("src/thesis.tex"));
        assert_eq!(out, ["-interaction=nonstopmode", "thesis.tex", "thesis.idx"]);
    }

    #[cfg(unix)]
    #[test]
    fn process_invoker_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ProcessInvoker::new(dir.path().to_path_buf());
        let mut ok = RunnerDescriptor::new("echo", RunnerKind::Custom, "tex", "txt");
        ok.args = vec!["%input".into()];
        let run = inv.invoke(&ok, &RelPath::new("doc.tex")).unwrap();
        assert!(run.success);
        assert_eq!(run.stdout.trim(), "doc");

        let fail = RunnerDescriptor::new("false", RunnerKind::Custom, "tex", "txt");
        let run = inv.invoke(&fail, &RelPath::new("doc.tex")).unwrap();
        assert!(!run.success);
    }

    #[test]
    fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let inv = ProcessInvoker::new(dir.path().to_path_buf());
        let ghost = RunnerDescriptor::new("texbuild-no-such-tool", RunnerKind::Custom, "tex", "txt");
        assert!(inv.invoke(&ghost, &RelPath::new("doc.tex")).is_err());
    }
}
