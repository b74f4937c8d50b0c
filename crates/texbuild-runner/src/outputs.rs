use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use texbuild_core::RelPath;
use tracing::debug;

/// Moves each file of `files` that lies below `from` to the same place below `to`. Returns the
/// moves made, old path to new path.
pub fn relocate<'a>(
    root: &Path,
    files: impl IntoIterator<Item = &'a RelPath>,
    from: &RelPath,
    to: &RelPath,
) -> Result<BTreeMap<RelPath, RelPath>> {
    let mut moved = BTreeMap::new();
    for old in files {
        let Some(new) = old.rebase(from, to) else {
            continue;
        };
        move_file(root, old, &new)?;
        moved.insert(old.clone(), new);
    }
    if !moved.is_empty() {
        debug!("moved {} files from {} to {}", moved.len(), from, to);
    }
    Ok(moved)
}

/// Moves build outputs (path to extension, as listed by the tracker) into `output_dir`, keeping
/// their names.
pub fn move_outputs(root: &Path, outputs: &BTreeMap<RelPath, String>, output_dir: &RelPath) -> Result<Vec<RelPath>> {
    let mut placed = Vec::new();
    for path in outputs.keys() {
        let target = output_dir.join(path.file_name());
        move_file(root, path, &target)?;
        placed.push(target);
    }
    Ok(placed)
}

fn move_file(root: &Path, from: &RelPath, to: &RelPath) -> Result<()> {
    let src = from.to_path(root);
    let dst = to.to_path(root);
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| format!("replace {}", dst.display()))?;
    }
    std::fs::rename(&src, &dst).with_context(|| format!("move {} to {}", src.display(), dst.display()))?;
    Ok(())
}
