//! Signals the core tool leaves behind: the `-recorder` file list (`.fls`), the citations in its
//! `.aux` files and a few rerun hints in its log. Anything beyond that is left to dedicated log
//! parsers.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use texbuild_core::{RelPath, SessionContext};
use tracing::debug;

/// Files listed by one `.fls` recorder file, as absolute paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecorderLog {
    pub inputs: BTreeSet<PathBuf>,
    pub outputs: BTreeSet<PathBuf>,
}

/// Parses recorder output. Relative entries are resolved against the last `PWD` line, or `cwd`
/// before the first one.
pub fn parse_fls(text: &str, cwd: &Path) -> RecorderLog {
    let mut pwd = cwd.to_path_buf();
    let mut log = RecorderLog::default();
    for line in text.lines() {
        let line = line.trim_end();
        if let Some(p) = line.strip_prefix("PWD ") {
            pwd = PathBuf::from(p);
        } else if let Some(p) = line.strip_prefix("INPUT ") {
            log.inputs.insert(pwd.join(p));
        } else if let Some(p) = line.strip_prefix("OUTPUT ") {
            log.outputs.insert(pwd.join(p));
        }
    }
    log
}

/// Rerun hints found in a core tool log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogSignals {
    pub latex_rerun: bool,
    pub bib_rerun: bool,
}

pub fn parse_log(text: &str) -> LogSignals {
    let lower = text.to_ascii_lowercase();
    LogSignals {
        latex_rerun: lower.contains("rerun to get")
            || lower.contains("label(s) may have changed")
            || lower.contains("please rerun latex"),
        bib_rerun: ["(re)run bibtex", "(re)run biber", "rerun bibtex", "rerun biber"].iter().any(|s| lower.contains(s)),
    }
}

/// Keys of the `\citation{..}` lines in `text`. One line may cite several comma-separated keys.
pub fn parse_aux_citations(text: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for line in text.lines() {
        let Some(rest) = line.trim_start().strip_prefix("\\citation{") else {
            continue;
        };
        let Some((list, _)) = rest.split_once('}') else {
            continue;
        };
        keys.extend(list.split(',').map(str::trim).filter(|k| !k.is_empty()).map(str::to_string));
    }
    keys
}

fn aux_includes(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter_map(|l| l.trim_start().strip_prefix("\\@input{"))
        .filter_map(|rest| rest.split_once('}').map(|(name, _)| name))
}

/// Citations of `aux` (a path below `dir`) and of the `.aux` files it pulls in with `\@input`.
/// `None` if `aux` itself does not exist.
fn read_citations(dir: &Path, aux: &str) -> Result<Option<BTreeSet<String>>> {
    let Some(text) = read_lossy(&dir.join(aux))? else {
        return Ok(None);
    };
    let mut keys = parse_aux_citations(&text);
    let mut seen: HashSet<String> = HashSet::from([aux.to_string()]);
    let mut pending: Vec<String> = aux_includes(&text).map(str::to_string).collect();
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(text) = read_lossy(&dir.join(&name))? {
            keys.extend(parse_aux_citations(&text));
            pending.extend(aux_includes(&text).map(str::to_string));
        }
    }
    Ok(Some(keys))
}

impl RecorderLog {
    /// Inputs inside `root`, relative to it. System files (the TeX tree, fonts) are dropped.
    pub fn project_inputs(&self, root: &Path) -> HashSet<RelPath> {
        let canonical = std::fs::canonicalize(root).ok();
        self.inputs
            .iter()
            .filter_map(|p| {
                RelPath::from_path(root, p).or_else(|| canonical.as_deref().and_then(|c| RelPath::from_path(c, p)))
            })
            .filter(|p| !p.is_root())
            .collect()
    }

    /// Names of the packages (`.sty` inputs) the document loaded.
    pub fn packages(&self) -> BTreeSet<String> {
        self.inputs
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e == "sty"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect()
    }
}

fn read_lossy(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

/// Feeds what the last core run of `source` recorded into `session`: the files it read, the
/// packages it loaded, rerun requests from its log and, for classic bibliographies, whether the
/// set of cited keys changed since the previous run. Missing files leave the session as is.
pub fn collect_core_signals(root: &Path, source: &RelPath, session: &mut SessionContext) -> Result<()> {
    let base = source.as_str().strip_suffix(".tex").unwrap_or(source.as_str());
    let dir = source.parent().unwrap_or_else(|| RelPath::new("")).to_path(root);

    if let Some(text) = read_lossy(&RelPath::new(format!("{base}.fls")).to_path(root))? {
        let log = parse_fls(&text, &dir);
        session.core_inputs = log.project_inputs(root);
        session.packages = Some(log.packages());
        debug!("core run read {} project files", session.core_inputs.len());
    }
    if !session.biblatex_mode && !session.has_package("biblatex") {
        let aux = format!("{}.aux", source.file_name().strip_suffix(".tex").unwrap_or(source.file_name()));
        if let Some(citations) = read_citations(&dir, &aux)? {
            let previous = session.citations.as_ref();
            let changed = match previous {
                Some(previous) => *previous != citations,
                None => !citations.is_empty(),
            };
            if changed {
                debug!("cited keys changed, {} now", citations.len());
                session.bib_files_changed = true;
            }
            session.citations = Some(citations);
        }
    }
    if let Some(text) = read_lossy(&RelPath::new(format!("{base}.log")).to_path(root))? {
        let signals = parse_log(&text);
        session.latex_rerun |= signals.latex_rerun;
        session.bibtex_rerun |= signals.bib_rerun;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FLS: &str = "PWD /home/u/thesis/src
INPUT /usr/share/texmf/tex/latex/base/article.cls
INPUT /usr/share/texmf/tex/latex/biblatex/biblatex.sty
INPUT /usr/share/texmf/tex/latex/hyperref/hyperref.sty
INPUT ./thesis.tex
INPUT thesis.aux
OUTPUT thesis.aux
INPUT thesis.toc
OUTPUT thesis.toc
OUTPUT thesis.pdf
";

    #[test]
    fn fls_entries_resolve_against_pwd() {
        let log = parse_fls(FLS, Path::new("/elsewhere"));
        assert!(log.inputs.contains(Path::new("/home/u/thesis/src/thesis.aux")));
        assert!(log.outputs.contains(Path::new("/home/u/thesis/src/thesis.pdf")));
        assert_eq!(log.packages().into_iter().collect::<Vec<_>>(), ["biblatex", "hyperref"]);
    }

    #[test]
    fn only_project_inputs_are_kept() {
        let log = parse_fls(FLS, Path::new("/elsewhere"));
        let inputs = log.project_inputs(Path::new("/home/u/thesis"));
        let expected: HashSet<RelPath> =
            ["src/thesis.tex", "src/thesis.aux", "src/thesis.toc"].into_iter().map(RelPath::new).collect();
        assert_eq!(inputs, expected);
    }

    #[test]
    fn log_rerun_hints() {
        let s = parse_log("LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.");
        assert_eq!(s, LogSignals { latex_rerun: true, bib_rerun: false });
        let s = parse_log("Package biblatex Warning: Please (re)run Biber on the file:\n(biblatex)                thesis");
        assert!(s.bib_rerun);
        assert_eq!(parse_log("Output written on thesis.pdf (3 pages)."), LogSignals::default());
    }

    #[test]
    fn collect_reads_files_next_to_source() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        let fls = format!("PWD {}\nINPUT doc.toc\nINPUT /usr/share/texmf/natbib.sty\n", root.join("src").display());
        std::fs::write(root.join("src/doc.fls"), fls).unwrap();
        std::fs::write(root.join("src/doc.log"), "Rerun to get outlines right").unwrap();

        let mut session = SessionContext::new();
        collect_core_signals(root, &RelPath::new("src/doc.tex"), &mut session).unwrap();
        assert!(session.is_core_input(&RelPath::new("src/doc.toc")));
        assert!(session.has_package("natbib"));
        assert!(session.latex_rerun);
        assert!(!session.bibtex_rerun);
    }

    #[test]
    fn citations_are_split_and_deduplicated() {
        let aux = "\\relax\n\\citation{knuth84}\n\\citation{lamport86, knuth84}\n\\bibdata{refs}\n";
        let keys: Vec<_> = parse_aux_citations(aux).into_iter().collect();
        assert_eq!(keys, ["knuth84", "lamport86"]);
    }

    #[test]
    fn new_citation_marks_bibliography_changed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let source = RelPath::new("doc.tex");
        let mut session = SessionContext::new();

        std::fs::write(root.join("doc.aux"), "\\citation{knuth84}\n\\@input{chap.aux}\n").unwrap();
        collect_core_signals(root, &source, &mut session).unwrap();
        assert!(session.bib_files_changed);

        session.bib_files_changed = false;
        collect_core_signals(root, &source, &mut session).unwrap();
        assert!(!session.bib_files_changed);

        std::fs::write(root.join("chap.aux"), "\\citation{lamport86}\n").unwrap();
        collect_core_signals(root, &source, &mut session).unwrap();
        assert!(session.bib_files_changed);
        assert_eq!(session.citations.as_ref().map(|c| c.len()), Some(2));
    }

    #[test]
    fn biblatex_documents_ignore_aux_citations() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("doc.aux"), "\\citation{knuth84}\n").unwrap();
        let mut session = SessionContext::new();
        session.biblatex_mode = true;
        collect_core_signals(root, &RelPath::new("doc.tex"), &mut session).unwrap();
        assert!(!session.bib_files_changed);
        assert!(session.citations.is_none());
    }

    #[test]
    fn collect_without_files_changes_nothing() {
        let dir = tempdir().unwrap();
        let mut session = SessionContext::new();
        collect_core_signals(dir.path(), &RelPath::new("doc.tex"), &mut session).unwrap();
        assert!(session.packages.is_none());
        assert!(session.core_inputs.is_empty());
        assert!(session.citations.is_none());
        assert!(!session.bib_files_changed);
    }
}
