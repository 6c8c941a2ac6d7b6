//! Binary path resolution overriding the system `PATH`.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The fixed allowlist of command names subject to `FZ_SHELL_PATH`-driven
/// rewriting.
pub const REWRITABLE_COMMANDS: &[&str] = &[
    "grep", "awk", "sed", "cut", "tr", "cat", "head", "tail", "sort", "uniq", "wc", "find",
    "xargs", "echo", "printf", "bash", "sh", "gawk", "perl", "python", "python3", "java", "gcc",
    "g++", "make", "cmake", "git", "zip", "unzip", "tar", "gzip", "gunzip", "curl", "wget", "nc",
    "ping", "ssh", "scp",
];

/// Resolves binaries using a custom shell path, or leaves the system `PATH`
/// alone when no override is configured.
pub struct ShellPathResolver {
    custom_shell_path: Option<String>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl ShellPathResolver {
    pub fn new(custom_shell_path: Option<String>) -> Self {
        Self {
            custom_shell_path,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn separator() -> char {
        if cfg!(windows) { ';' } else { ':' }
    }

    /// Directories to search for binaries: the configured override, split
    /// by the platform separator, or the system `PATH` as a fallback.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        match &self.custom_shell_path {
            Some(custom) => custom
                .split(Self::separator())
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            None => std::env::var("PATH")
                .unwrap_or_default()
                .split(Self::separator())
                .map(PathBuf::from)
                .collect(),
        }
    }

    /// Resolve a command name to an absolute path, checking the cache
    /// first. On Windows, also tries a `.exe` suffix.
    pub fn resolve_command(&self, command: &str) -> Option<PathBuf> {
        if let Some(cached) = self.cache.lock().unwrap().get(command) {
            return cached.clone();
        }

        let resolved = self.search_paths().into_iter().find_map(|dir| {
            let direct = dir.join(command);
            if direct.is_file() {
                return Some(direct);
            }
            if cfg!(windows) {
                let exe = dir.join(format!("{command}.exe"));
                if exe.is_file() {
                    return Some(exe);
                }
            }
            None
        });

        self.cache
            .lock()
            .unwrap()
            .insert(command.to_string(), resolved.clone());
        resolved
    }

    /// Replace bare command names in a shell command string with their
    /// resolved absolute paths. A strict no-op unless a custom shell path
    /// is configured — normal PATH resolution is left to the invoked shell
    /// otherwise.
    pub fn rewrite_commands(&self, command_string: &str) -> String {
        if self.custom_shell_path.is_none() {
            return command_string.to_string();
        }

        let mut rewritten = command_string.to_string();
        for cmd in REWRITABLE_COMMANDS {
            if let Some(path) = self.resolve_command(cmd) {
                let pattern = format!(r"\b{}\b", regex::escape(cmd));
                let re = Regex::new(&pattern).expect("static pattern compiles");
                let replacement = path.to_string_lossy().replace('$', "$$");
                rewritten = re.replace_all(&rewritten, replacement.as_str()).into_owned();
            }
        }
        rewritten
    }

    /// All executable files discoverable across the search paths, used for
    /// diagnostics.
    pub fn list_available_binaries(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .search_paths()
            .iter()
            .filter_map(|dir| std::fs::read_dir(dir).ok())
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_executable(&entry.path()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.is_file()
        && std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
