use texbuild_core::{BibBackend, BibConfig, RelPath, RunnerDescriptor, RunnerRegistry, SessionContext};
use texbuild_tracker::Scanner;
use tracing::debug;

pub fn session_bib_config(session: &SessionContext) -> BibConfig {
    BibConfig { biblatex_mode: session.biblatex_mode, backend: session.biblatex_backend }
}

/// Bibliography setup of `source`, starting from the session values.
///
/// Loading `biblatex` switches on biblatex mode. Without a configured backend, `biber` is assumed
/// when `<base>.bcf` is newer than `<base>-blx.bib`, a missing file being older than any existing
/// one. Otherwise the backend stays unset.
pub fn detect_bib_config(session: &SessionContext, source: &RelPath, scanner: &dyn Scanner) -> BibConfig {
    let mut config = session_bib_config(session);
    if !session.has_package("biblatex") {
        return config;
    }
    config.biblatex_mode = true;
    if config.backend.is_none() {
        let base = source.as_str().strip_suffix(".tex").unwrap_or(source.as_str());
        let blx = scanner.stamp(&RelPath::new(format!("{base}-blx.bib")));
        let bcf = scanner.stamp(&RelPath::new(format!("{base}.bcf")));
        if blx < bcf {
            config.backend = Some(BibBackend::Biber);
        }
        debug!("biblatex backend for {}: {:?}", source, config.backend);
    }
    config
}

pub fn resolve_bib_runner<'r>(config: &BibConfig, registry: &'r RunnerRegistry) -> Option<&'r RunnerDescriptor> {
    match (config.biblatex_mode, config.backend) {
        (true, Some(backend)) => registry.get(backend.runner_id()),
        _ => registry.find("bib", Some("aux")),
    }
}
