//! Cache calculator (`cache://`).

use crate::common::{write_run_artifacts, BackendOutcome};
use fz_core::{Cancellation, Model};
use fz_process::ShellPathResolver;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Resolve a `cache://` payload into the directories to search, in
/// priority order: a literal existing directory; a glob pattern; or,
/// as a fallback, a regex matched against basenames in the parent
/// directory.
pub fn resolve_cache_roots(pattern: &str) -> Vec<PathBuf> {
    let literal = PathBuf::from(pattern);
    if literal.is_dir() {
        return vec![literal];
    }

    if pattern.contains(['*', '?', '[']) {
        if let Ok(paths) = glob::glob(pattern) {
            let matched: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_dir()).collect();
            if !matched.is_empty() {
                return matched;
            }
        }
        return Vec::new();
    }

    let path = Path::new(pattern);
    let (parent, basename_pattern) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if parent.as_os_str().len() > 0 => {
            (parent.to_path_buf(), name.to_string_lossy().into_owned())
        }
        _ => return Vec::new(),
    };

    let Ok(re) = regex::Regex::new(&basename_pattern) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(&parent) else {
        return Vec::new();
    };

    let mut matched: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .map(|n| re.is_match(&n.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    matched.sort();
    matched
}

/// Try every candidate root for `hash`; for each match, validate that
/// extraction against the candidate would not yield any null output
/// (None-output invalidation, §4.4.3/§9 Open Question). Returns the
/// first valid match.
pub async fn find_valid_cache_match(
    roots: &[PathBuf],
    hash: &str,
    model: &Model,
    shell_path: &ShellPathResolver,
) -> Option<PathBuf> {
    for root in roots {
        if let Ok(Some(candidate)) = fz_hash::find_cache_match(root, hash) {
            if is_cache_hit_valid(&candidate, model, shell_path).await {
                return Some(candidate);
            }
        }
    }
    None
}

async fn is_cache_hit_valid(candidate: &Path, model: &Model, shell_path: &ShellPathResolver) -> bool {
    if model.output.is_empty() {
        return true;
    }
    match fz_extract::extract_outputs(candidate, model, shell_path).await {
        Ok(outputs) => !fz_extract::any_null(&outputs),
        Err(_) => false,
    }
}

/// Copy every file from `source` into `case_dir`, overwriting, preserving
/// mtimes where possible.
pub fn copy_into(source: &Path, case_dir: &Path) -> std::io::Result<()> {
    for entry in walk_files(source)? {
        let rel = entry.strip_prefix(source).unwrap_or(&entry);
        let dst = case_dir.join(rel);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&entry, &dst)?;
        if let Ok(metadata) = std::fs::metadata(&entry) {
            if let Ok(mtime) = metadata.modified() {
                let _ = filetime_set(&dst, mtime);
            }
        }
    }
    Ok(())
}

fn filetime_set(path: &Path, mtime: SystemTime) -> std::io::Result<()> {
    let file = std::fs::File::open(path)?;
    file.set_modified(mtime)
}

fn walk_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, current: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if path.is_file() && path.file_name().map(|n| n != fz_hash::HASH_FILENAME).unwrap_or(true) {
            out.push(path);
        }
    }
    Ok(())
}

/// Execute the `cache://` calculator against one case: resolve the
/// pattern, search for a valid hit, copy it in on success. On miss,
/// returns an error outcome — the dispatcher treats this as non-blocking
/// and moves on to the next calculator in the chain.
pub async fn execute(
    pattern: &str,
    case_dir: &Path,
    hash: &str,
    model: &Model,
    shell_path: &ShellPathResolver,
    cancellation: &Cancellation,
) -> BackendOutcome {
    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(format!("cache://{pattern}"));
    }

    let roots = resolve_cache_roots(pattern);
    let start = SystemTime::now();

    match find_valid_cache_match(&roots, hash, model, shell_path).await {
        Some(matched) => {
            if let Err(e) = copy_into(&matched, case_dir) {
                return BackendOutcome::error(
                    format!("cache://{pattern}"),
                    format!("failed to copy cache hit from {}: {e}", matched.display()),
                );
            }
            let end = SystemTime::now();
            let _ = write_run_artifacts(
                case_dir,
                "",
                "",
                &format!("cache hit: {}", matched.display()),
                0,
                start,
                end,
            );
            BackendOutcome::cached(format!("cache://{pattern}"))
        }
        None => BackendOutcome::error(format!("cache://{pattern}"), "no cache hit"),
    }
}
