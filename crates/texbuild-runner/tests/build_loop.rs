use std::cell::{Cell, RefCell};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tempfile::tempdir;
use texbuild_core::{CancelToken, RelPath, RunnerDescriptor, RunnerId};
use texbuild_runner::{BuildLoop, Config, ToolInvoker, ToolRun};
use texbuild_storage::FileCacheStore;

/// Stands in for the TeX toolchain: writes the files a real run would, with strictly increasing
/// timestamps.
struct FakeTex {
    root: PathBuf,
    clock: Cell<u64>,
    latex_runs: Cell<u32>,
    toc_moves_every_pass: bool,
    /// Keys the document cites; written to `doc.aux` on every pass.
    cites: Rc<RefCell<Vec<String>>>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl FakeTex {
    fn new(root: &Path, calls: Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            root: root.to_path_buf(),
            clock: Cell::new(1_000),
            latex_runs: Cell::new(0),
            toc_moves_every_pass: false,
            cites: Rc::new(RefCell::new(Vec::new())),
            calls,
        }
    }

    fn put(&self, name: &str, content: &str) {
        let tick = self.clock.get() + 1;
        self.clock.set(tick);
        write_at(&self.root, name, content, tick);
    }
}

impl ToolInvoker for FakeTex {
    fn invoke(&self, runner: &RunnerDescriptor, _source: &RelPath) -> Result<ToolRun> {
        self.calls.borrow_mut().push(runner.id.to_string());
        match runner.id.as_str() {
            "pdflatex" => {
                let n = self.latex_runs.get() + 1;
                self.latex_runs.set(n);
                let toc = if self.toc_moves_every_pass {
                    format!("\\contentsline {{section}}{{Intro}}{{{n}}}")
                } else {
                    "\\contentsline {section}{Intro}{1}".to_string()
                };
                let fls = format!(
                    "PWD {}\nINPUT doc.tex\nINPUT /usr/share/texmf/tex/latex/base/article.cls\nINPUT doc.aux\nINPUT doc.toc\nINPUT doc.bbl\nOUTPUT doc.aux\nOUTPUT doc.toc\nOUTPUT doc.pdf\n",
                    self.root.display()
                );
                let mut aux = "\\relax".to_string();
                for key in self.cites.borrow().iter() {
                    aux.push_str(&format!("\n\\citation{{{key}}}"));
                }
                self.put("doc.aux", &aux);
                self.put("doc.toc", &toc);
                self.put("doc.fls", &fls);
                self.put("doc.log", "Output written on doc.pdf (1 page).");
                self.put("doc.pdf", &format!("%PDF pass {n}"));
            }
            "bibtex" => {
                self.put("doc.bbl", "\\begin{thebibliography}{1}\\end{thebibliography}");
                self.put("doc.blg", "This is BibTeX");
            }
            other => panic!("unexpected runner {other}"),
        }
        Ok(ToolRun { success: true, code: Some(0), stdout: String::new() })
    }
}

fn write_at(root: &Path, rel: &str, content: &str, secs: u64) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    let f = File::options().write(true).open(&path).unwrap();
    f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

fn config(temp_dir: Option<&str>, output_dir: Option<&str>) -> Config {
    let mut cfg = Config::default_for_repo("doc");
    cfg.project.main = "doc.tex".to_string();
    cfg.project.temp_dir = temp_dir.map(str::to_string);
    cfg.project.output_dir = output_dir.map(str::to_string);
    cfg
}

fn build_loop(root: &Path, cfg: Config, tex: FakeTex) -> BuildLoop {
    let store = FileCacheStore::new(root.join(".texbuild").join("cache"));
    BuildLoop::new(root.to_path_buf(), cfg, Box::new(tex), Box::new(store))
}

fn ids(list: &[&str]) -> Vec<RunnerId> {
    list.iter().map(|s| RunnerId::from_str(*s)).collect()
}

#[test]
fn test_new_toc_costs_one_extra_pass() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_at(root, "doc.tex", "\\documentclass{article}\\tableofcontents", 10);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut b = build_loop(root, config(None, Some("out")), FakeTex::new(root, calls.clone()));

    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.passes, 2);
    assert!(!report.maxed_out);
    assert!(report.runners_run.is_empty());
    assert!(report.initial_changes.is_empty());
    assert_eq!(report.outputs, [RelPath::new("out/doc.pdf")]);
    assert_eq!(std::fs::read_to_string(root.join("out/doc.pdf")).unwrap(), "%PDF pass 2");

    // nothing changed since: one pass settles it
    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.passes, 1);
    assert_eq!(calls.borrow().len(), 3);
}

#[test]
fn test_changed_bibliography_runs_bibtex_once() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_at(root, "doc.tex", "\\documentclass{article}\\bibliography{refs}", 10);
    write_at(root, "refs.bib", "@book{knuth84}", 10);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut b = build_loop(root, config(None, None), FakeTex::new(root, calls.clone()));

    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.initial_changes, [RelPath::new("refs.bib")]);
    assert_eq!(report.runners_run, ids(&["bibtex"]));
    assert_eq!(report.passes, 2);
    assert_eq!(*calls.borrow(), ["pdflatex", "bibtex", "pdflatex"]);

    let report = b.run(&CancelToken::new()).unwrap();
    assert!(report.runners_run.is_empty());
    assert_eq!(report.passes, 1);

    write_at(root, "refs.bib", "@book{knuth84} @article{lamport86}", 5_000);
    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.runners_run, ids(&["bibtex"]));
    assert!(!b.session().bib_files_changed);
}

#[test]
fn test_new_citation_runs_bibtex_with_unchanged_bib_file() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_at(root, "doc.tex", "\\documentclass{article}\\cite{knuth84}\\bibliography{refs}", 10);
    write_at(root, "refs.bib", "@book{knuth84} @article{lamport86}", 10);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let tex = FakeTex::new(root, calls.clone());
    let cites = tex.cites.clone();
    cites.borrow_mut().push("knuth84".to_string());
    let mut b = build_loop(root, config(None, None), tex);

    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.runners_run, ids(&["bibtex"]));

    cites.borrow_mut().push("lamport86".to_string());
    calls.borrow_mut().clear();
    let report = b.run(&CancelToken::new()).unwrap();
    assert!(report.initial_changes.is_empty());
    assert_eq!(report.runners_run, ids(&["bibtex"]));
    assert_eq!(*calls.borrow(), ["pdflatex", "bibtex", "pdflatex"]);

    // same citations again: nothing for bibtex to do
    let report = b.run(&CancelToken::new()).unwrap();
    assert!(report.runners_run.is_empty());
}

#[test]
fn test_unsettled_document_stops_at_the_pass_limit() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_at(root, "doc.tex", "\\documentclass{article}", 10);
    let mut cfg = config(None, None);
    cfg.build.max_passes = 3;
    let mut tex = FakeTex::new(root, Rc::new(RefCell::new(Vec::new())));
    tex.toc_moves_every_pass = true;
    let mut b = build_loop(root, cfg, tex);

    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.passes, 3);
    assert!(report.maxed_out);
}

#[test]
fn test_temp_files_return_to_the_temp_dir() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_at(root, "doc.tex", "\\documentclass{article}", 10);
    write_at(root, "tmp/doc.aux", "\\relax", 20);
    write_at(root, "tmp/doc.log", "old log", 20);
    let mut b = build_loop(root, config(Some("tmp"), None), FakeTex::new(root, Rc::new(RefCell::new(Vec::new()))));

    let report = b.run(&CancelToken::new()).unwrap();
    assert_eq!(report.initial_changes, [RelPath::new("doc.aux"), RelPath::new("doc.log")]);
    for name in ["doc.aux", "doc.log", "doc.fls"] {
        assert!(root.join("tmp").join(name).exists(), "{name} not in tmp/");
        assert!(!root.join(name).exists(), "{name} left next to the source");
    }
    assert!(root.join("doc.toc").exists());
    assert!(root.join("doc.pdf").exists());
}

#[test]
fn test_cancelled_build_stops_before_any_tool_runs() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_at(root, "doc.tex", "\\documentclass{article}", 10);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut b = build_loop(root, config(None, None), FakeTex::new(root, calls.clone()));

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = b.run(&cancel).unwrap_err();
    assert!(matches!(err.downcast_ref::<texbuild_core::Error>(), Some(texbuild_core::Error::Cancelled)));
    assert!(calls.borrow().is_empty());
}
