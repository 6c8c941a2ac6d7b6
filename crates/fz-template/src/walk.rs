//! Minimal recursive directory walk shared by discovery and compilation.
//! Kept local rather than depending on a walker crate — the traversal
//! needed here is a handful of lines.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Relative paths (from `root`) of every regular file under `root`, in
/// directory-read order (not sorted — callers that need a canonical order
/// sort explicitly).
pub fn files_relative(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if root.is_file() {
        out.push(PathBuf::from(root.file_name().unwrap_or_default()));
        return Ok(out);
    }
    walk(root, root, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, current: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(current)
        .with_context(|| format!("failed to read directory {}", current.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if path.is_file() {
            out.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(())
}
