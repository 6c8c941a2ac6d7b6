//! Calculator backends: one `execute()` entry point dispatching over the
//! four `CalculatorUri` schemes. Each variant is a stateless singleton
//! configured once at engine construction and borrows a compiled case
//! directory for the duration of one execution.

pub mod cache;
pub mod common;
pub mod funz;
pub mod sh;
pub mod ssh;

pub use common::{BackendOutcome, BackendStatus};
pub use ssh::SshPool;

use fz_core::{CalculatorUri, Cancellation, Model};
use fz_process::ShellPathResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by every calculator variant for one engine run.
#[derive(Clone)]
pub struct CalculatorConfig {
    pub shell_path: Arc<ShellPathResolver>,
    pub submitter_cwd: PathBuf,
    pub ssh_auto_accept_hostkeys: bool,
    pub ssh_keepalive_secs: u64,
    pub funz_bind_port: u16,
    pub funz_discovery_timeout: Duration,
}

/// The dispatch table: one variant per scheme, each a long-lived backend
/// instance reused across every case and attempt in a run.
#[derive(Clone)]
pub enum Calculator {
    Local {
        shell_path: Arc<ShellPathResolver>,
        submitter_cwd: PathBuf,
    },
    Ssh {
        pool: SshPool,
    },
    Cache {
        shell_path: Arc<ShellPathResolver>,
    },
    Funz {
        bind_port: u16,
        discovery_timeout: Duration,
    },
}

impl Calculator {
    /// Build the one instance of each variant a run needs, from shared
    /// config. The dispatcher (fz-scheduler) keeps these alive for the
    /// whole run and looks one up per scheme as it walks a case's
    /// calculator chain.
    pub fn local(config: &CalculatorConfig) -> Self {
        Calculator::Local {
            shell_path: config.shell_path.clone(),
            submitter_cwd: config.submitter_cwd.clone(),
        }
    }

    pub fn ssh(config: &CalculatorConfig) -> Self {
        Calculator::Ssh {
            pool: SshPool::new(config.ssh_auto_accept_hostkeys, config.ssh_keepalive_secs),
        }
    }

    pub fn cache(config: &CalculatorConfig) -> Self {
        Calculator::Cache {
            shell_path: config.shell_path.clone(),
        }
    }

    pub fn funz(config: &CalculatorConfig) -> Self {
        Calculator::Funz {
            bind_port: config.funz_bind_port,
            discovery_timeout: config.funz_discovery_timeout,
        }
    }

    /// The singleton matching `uri`'s scheme, built fresh from `config`.
    /// Used by call sites (tests, single-shot CLI commands) that don't
    /// keep a standing registry around.
    pub fn for_uri(uri: &CalculatorUri, config: &CalculatorConfig) -> Self {
        match uri {
            CalculatorUri::Sh { .. } => Self::local(config),
            CalculatorUri::Ssh { .. } => Self::ssh(config),
            CalculatorUri::Cache { .. } => Self::cache(config),
            CalculatorUri::Funz { .. } => Self::funz(config),
        }
    }

    /// Run `uri`'s payload against `case_dir`. `hash` is the case's
    /// `.fz_hash` manifest content, consulted only by the cache variant.
    pub async fn execute(
        &self,
        uri: &CalculatorUri,
        case_dir: &Path,
        hash: &str,
        model: &Model,
        cancellation: &Cancellation,
    ) -> BackendOutcome {
        match (self, uri) {
            (Calculator::Local { shell_path, submitter_cwd }, CalculatorUri::Sh { command }) => {
                sh::execute(command, case_dir, submitter_cwd, shell_path, cancellation).await
            }
            (
                Calculator::Ssh { pool },
                CalculatorUri::Ssh { user, host, port, command },
            ) => ssh::execute(pool, user.as_deref(), host, *port, command, case_dir, cancellation).await,
            (Calculator::Cache { shell_path }, CalculatorUri::Cache { pattern }) => {
                cache::execute(pattern, case_dir, hash, model, shell_path, cancellation).await
            }
            (
                Calculator::Funz { bind_port, discovery_timeout },
                CalculatorUri::Funz { host, code, .. },
            ) => funz::execute(*bind_port, host.as_deref(), code, case_dir, *discovery_timeout, cancellation).await,
            (_, other) => BackendOutcome::error(
                other.to_string(),
                "calculator backend does not match this URI's scheme",
            ),
        }
    }
}
