//! Case Hasher (C3): content-addressed fingerprint of a compiled case
//! directory, and the cache match protocol built on top of it.
//!
//! The `.fz_hash` format (MD5 + two spaces + relative path, input files
//! first then alphabetical) and the cache directory search order are
//! fixed on-disk formats kept byte-for-byte stable across runs.
//!
//! Two cases that differ only in variables that never appear in any file
//! compile to byte-identical directories and therefore hash identically;
//! they may legitimately share a cache entry. This is accepted, documented
//! behavior (see the Open Question resolution in DESIGN.md), not a bug.

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};

pub const HASH_FILENAME: &str = ".fz_hash";

/// Compute and write `.fz_hash` inside `dir`. `input_files` lists paths
/// (relative to `dir`) in the order they were provided by the template;
/// these sort first, followed by every other regular file in alphabetical
/// order. Returns the manifest contents that were written.
pub fn write_hash_manifest(dir: &Path, input_files: &[PathBuf]) -> Result<String> {
    let manifest = compute_hash_manifest(dir, input_files)?;
    std::fs::write(dir.join(HASH_FILENAME), &manifest)
        .with_context(|| format!("failed to write {} in {}", HASH_FILENAME, dir.display()))?;
    Ok(manifest)
}

/// Compute the manifest contents without writing them, for tests and for
/// the cache-match protocol which only needs to compare a candidate's
/// recorded manifest against a freshly-computed one.
pub fn compute_hash_manifest(dir: &Path, input_files: &[PathBuf]) -> Result<String> {
    let mut ordered: Vec<PathBuf> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for rel in input_files {
        if ordered.iter().all(|p| p != rel) {
            ordered.push(rel.clone());
            seen.insert(rel.clone());
        }
    }

    let mut remaining = list_regular_files_relative(dir)?;
    remaining.retain(|p| p.file_name().map(|n| n != HASH_FILENAME).unwrap_or(true));
    remaining.retain(|p| !seen.contains(p));
    remaining.sort();
    ordered.extend(remaining);

    let mut lines = Vec::with_capacity(ordered.len());
    for rel in &ordered {
        let abs = dir.join(rel);
        let digest = md5_hex(&abs)
            .with_context(|| format!("failed to hash {}", abs.display()))?;
        lines.push(format!("{digest}  {}", rel.display()));
    }

    Ok(lines.join("\n") + if lines.is_empty() { "" } else { "\n" })
}

fn list_regular_files_relative(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(dir, dir, &mut out)?;
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
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            out.push(rel);
        }
    }
    Ok(())
}

fn md5_hex(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Search for a directory under `base` (one level deep; `base` itself is
/// checked first) whose `.fz_hash` is byte-for-byte equal to `hash`.
/// Returns the first match in (sorted) directory-iteration order.
pub fn find_cache_match(base: &Path, hash: &str) -> Result<Option<PathBuf>> {
    if let Some(existing) = read_hash_file(base)? {
        if existing == hash {
            return Ok(Some(base.to_path_buf()));
        }
    }

    if !base.is_dir() {
        return Ok(None);
    }

    let mut children: Vec<PathBuf> = std::fs::read_dir(base)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    children.sort();

    for child in children {
        if let Some(existing) = read_hash_file(&child)? {
            if existing == hash {
                return Ok(Some(child));
            }
        }
    }

    Ok(None)
}

fn read_hash_file(dir: &Path) -> Result<Option<String>> {
    let path = dir.join(HASH_FILENAME);
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_lists_input_files_first_then_alphabetical() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("z.txt"), b"z").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("input.txt"), b"in").unwrap();

        let manifest = compute_hash_manifest(dir.path(), &[PathBuf::from("input.txt")]).unwrap();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("input.txt"));
        assert!(lines[1].ends_with("a.txt"));
        assert!(lines[2].ends_with("z.txt"));
    }

    #[test]
    fn manifest_excludes_fz_hash_itself() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join(HASH_FILENAME), b"stale").unwrap();

        let manifest = compute_hash_manifest(dir.path(), &[]).unwrap();
        assert!(!manifest.contains(HASH_FILENAME));
    }

    #[test]
    fn manifest_is_deterministic() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"content").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"more").unwrap();

        let m1 = compute_hash_manifest(dir.path(), &[]).unwrap();
        let m2 = compute_hash_manifest(dir.path(), &[]).unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn manifest_changes_when_a_byte_flips() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let m1 = compute_hash_manifest(dir.path(), &[]).unwrap();

        std::fs::write(dir.path().join("a.txt"), b"Content").unwrap();
        let m2 = compute_hash_manifest(dir.path(), &[]).unwrap();

        assert_ne!(m1, m2);
    }

    #[test]
    fn identical_content_same_hash_regardless_of_case_suffix() {
        // Two cases that differ only in a variable absent from any file
        // compile to byte-identical directories; their manifests (and
        // therefore cache keys) are identical. Accepted, documented
        // behavior per the Open Question resolution.
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        std::fs::write(dir_a.path().join("model.inp"), b"fixed content").unwrap();
        std::fs::write(dir_b.path().join("model.inp"), b"fixed content").unwrap();

        let ma = compute_hash_manifest(dir_a.path(), &[]).unwrap();
        let mb = compute_hash_manifest(dir_b.path(), &[]).unwrap();
        assert_eq!(ma, mb);
    }

    #[test]
    fn find_cache_match_checks_base_itself_first() {
        let base = tempdir().unwrap();
        std::fs::write(base.path().join(HASH_FILENAME), "abc123  a.txt\n").unwrap();
        let found = find_cache_match(base.path(), "abc123  a.txt\n").unwrap();
        assert_eq!(found, Some(base.path().to_path_buf()));
    }

    #[test]
    fn find_cache_match_searches_one_level_of_subdirectories() {
        let base = tempdir().unwrap();
        let sub = base.path().join("run-001");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join(HASH_FILENAME), "abc123  a.txt\n").unwrap();

        let found = find_cache_match(base.path(), "abc123  a.txt\n").unwrap();
        assert_eq!(found, Some(sub));
    }

    #[test]
    fn find_cache_match_returns_none_on_no_match() {
        let base = tempdir().unwrap();
        let found = find_cache_match(base.path(), "deadbeef  a.txt\n").unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn write_hash_manifest_persists_to_disk() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let written = write_hash_manifest(dir.path(), &[]).unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join(HASH_FILENAME)).unwrap();
        assert_eq!(written, on_disk);
    }
}
