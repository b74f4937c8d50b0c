//! File name classification shared by the scanner and the tracker.

const PROJECT_FILE_NAMES: &[&str] = &[".project", ".texlipse"];
const PROJECT_FILE_EXTS: &[&str] = &[".tex", ".cls", ".sty", ".ltx"];

pub fn has_matching_ext<S: AsRef<str>>(name: &str, exts: &[S]) -> bool {
    matching_ext(name, exts).is_some()
}

pub fn matching_ext<'a, S: AsRef<str>>(name: &str, exts: &'a [S]) -> Option<&'a str> {
    exts.iter().map(|e| e.as_ref()).find(|e| !e.is_empty() && name.ends_with(e))
}

pub fn is_project_file(name: &str) -> bool {
    PROJECT_FILE_NAMES.contains(&name) || has_matching_ext(name, PROJECT_FILE_EXTS)
}

/// True for names with a temporary extension, and for `.dvi` / `.ps` intermediates unless that
/// format is itself the final output.
pub fn is_temp_file<S: AsRef<str>>(name: &str, temp_exts: &[S], format: &str) -> bool {
    has_matching_ext(name, temp_exts)
        || (name.ends_with(".dvi") && format != "dvi")
        || (name.ends_with(".ps") && format != "ps")
}
