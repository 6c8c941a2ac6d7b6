//! Immutable run configuration loaded from `FZ_*` environment variables.
//!
//! A struct produced once from the environment and threaded explicitly
//! into the engine's constructor — no process-wide mutable state.

use fz_core::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "WARNING" | "WARN" => LogLevel::Warning,
            "INFO" => LogLevel::Info,
            "DEBUG" => LogLevel::Debug,
            _ => LogLevel::Error,
        }
    }

    /// Translate to a `tracing_subscriber::EnvFilter`-compatible directive.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub log_level: LogLevel,
    pub max_retries: u32,
    pub interpreter: Interpreter,
    pub max_workers: Option<usize>,
    pub ssh_auto_accept_hostkeys: bool,
    pub ssh_keepalive_secs: u64,
    pub shell_path: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Error,
            max_retries: 5,
            interpreter: Interpreter::Python,
            max_workers: None,
            ssh_auto_accept_hostkeys: false,
            ssh_keepalive_secs: 300,
            shell_path: None,
        }
    }
}

impl Configuration {
    /// Load configuration from `FZ_*` environment variables, falling back
    /// to the documented defaults on missing or malformed values.
    pub fn from_env() -> Self {
        Self::from_env_reader(|key| std::env::var(key).ok())
    }

    /// Testable variant: takes an explicit lookup function instead of
    /// reading the process environment directly.
    pub fn from_env_reader(get: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = get("FZ_LOG_LEVEL")
            .map(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::Error);

        let max_retries = get("FZ_MAX_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);

        let interpreter = get("FZ_INTERPRETER")
            .and_then(|v| v.parse::<Interpreter>().ok())
            .unwrap_or(Interpreter::Python);

        let max_workers = get("FZ_MAX_WORKERS").and_then(|v| v.parse::<usize>().ok());

        let ssh_auto_accept_hostkeys =
            parse_bool_env(get("FZ_SSH_AUTO_ACCEPT_HOSTKEYS"), false);

        let ssh_keepalive_secs = get("FZ_SSH_KEEPALIVE")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);

        let shell_path = get("FZ_SHELL_PATH");

        Self {
            log_level,
            max_retries,
            interpreter,
            max_workers,
            ssh_auto_accept_hostkeys,
            ssh_keepalive_secs,
            shell_path,
        }
    }

    /// Worker pool size: `max(M, configured_max_workers or auto)` per §4.5.
    /// `auto` falls back to the number of available CPUs.
    pub fn worker_count(&self, num_calculators: usize) -> usize {
        let configured = self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        num_calculators.max(configured).max(1)
    }
}

/// `true/1/yes/on` vs `false/0/no/off` (case-insensitive); any other value
/// (including unset) falls back to `default`.
fn parse_bool_env(raw: Option<String>, default: bool) -> bool {
    match raw.map(|v| v.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reader(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_no_env() {
        let cfg = Configuration::from_env_reader(reader(&[]));
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.interpreter, Interpreter::Python);
        assert_eq!(cfg.max_workers, None);
        assert!(!cfg.ssh_auto_accept_hostkeys);
        assert_eq!(cfg.ssh_keepalive_secs, 300);
        assert_eq!(cfg.shell_path, None);
    }

    #[test]
    fn max_retries_parses() {
        let cfg = Configuration::from_env_reader(reader(&[("FZ_MAX_RETRIES", "3")]));
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn malformed_max_retries_falls_back_to_default() {
        let cfg = Configuration::from_env_reader(reader(&[("FZ_MAX_RETRIES", "not-a-number")]));
        assert_eq!(cfg.max_retries, 5);
    }

    #[test]
    fn interpreter_invalid_falls_back_to_python() {
        let cfg = Configuration::from_env_reader(reader(&[("FZ_INTERPRETER", "cobol")]));
        assert_eq!(cfg.interpreter, Interpreter::Python);
    }

    #[test]
    fn interpreter_r_accepted() {
        let cfg = Configuration::from_env_reader(reader(&[("FZ_INTERPRETER", "R")]));
        assert_eq!(cfg.interpreter, Interpreter::R);
    }

    #[test]
    fn bool_env_accepts_all_truthy_spellings() {
        for v in ["true", "1", "yes", "on", "TRUE", "On"] {
            let cfg =
                Configuration::from_env_reader(reader(&[("FZ_SSH_AUTO_ACCEPT_HOSTKEYS", v)]));
            assert!(cfg.ssh_auto_accept_hostkeys, "expected true for '{v}'");
        }
    }

    #[test]
    fn bool_env_accepts_all_falsy_spellings() {
        for v in ["false", "0", "no", "off"] {
            let cfg =
                Configuration::from_env_reader(reader(&[("FZ_SSH_AUTO_ACCEPT_HOSTKEYS", v)]));
            assert!(!cfg.ssh_auto_accept_hostkeys, "expected false for '{v}'");
        }
    }

    #[test]
    fn bool_env_unrecognized_value_falls_back_to_default() {
        let cfg = Configuration::from_env_reader(reader(&[(
            "FZ_SSH_AUTO_ACCEPT_HOSTKEYS",
            "maybe",
        )]));
        assert!(!cfg.ssh_auto_accept_hostkeys);
    }

    #[test]
    fn worker_count_is_at_least_num_calculators() {
        let mut cfg = Configuration::from_env_reader(reader(&[]));
        cfg.max_workers = Some(2);
        assert_eq!(cfg.worker_count(5), 5);
        assert_eq!(cfg.worker_count(1), 2);
    }

    #[test]
    fn worker_count_auto_uses_available_parallelism() {
        let cfg = Configuration::from_env_reader(reader(&[]));
        assert!(cfg.worker_count(1) >= 1);
    }

    #[test]
    fn log_level_parses_all_variants() {
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("info"), LogLevel::Info);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warning);
        assert_eq!(LogLevel::parse("garbage"), LogLevel::Error);
    }
}
