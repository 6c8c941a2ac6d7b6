//! SSH calculator (`ssh://`).
//!
//! Shells out to the system `ssh`/`scp` binaries via `fz-process`'s spawn
//! primitives rather than embedding a protocol client. Connection *reuse*
//! is implemented with `ssh -M` control-master sockets pooled per
//! `(host, user)`, so repeated executions against the same host share one
//! authenticated session instead of paying a handshake per case.

use crate::common::{write_run_artifacts, BackendOutcome};
use fz_core::Cancellation;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Per-`(host, user)` control-master connection pool, owned by the `Ssh`
/// calculator variant for the lifetime of one engine invocation.
#[derive(Clone)]
pub struct SshPool {
    control_dir: std::path::PathBuf,
    auto_accept_hostkeys: bool,
    keepalive_secs: u64,
    masters: Arc<Mutex<HashMap<(String, String), ()>>>,
    remote_seq: Arc<AtomicU64>,
}

impl SshPool {
    pub fn new(auto_accept_hostkeys: bool, keepalive_secs: u64) -> Self {
        Self {
            control_dir: std::env::temp_dir().join("fz-ssh-control"),
            auto_accept_hostkeys,
            keepalive_secs,
            masters: Arc::new(Mutex::new(HashMap::new())),
            remote_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn control_path(&self, user: &str, host: &str) -> std::path::PathBuf {
        self.control_dir.join(format!("{user}@{host}.sock"))
    }

    fn host_key_opts(&self) -> Vec<String> {
        if self.auto_accept_hostkeys {
            vec![
                "-o".to_string(),
                "StrictHostKeyChecking=accept-new".to_string(),
            ]
        } else {
            Vec::new()
        }
    }

    /// Open a background control-master connection for `(host, user)` if
    /// one isn't already tracked. Idempotent: a second call for the same
    /// key is a no-op.
    async fn ensure_master(&self, user: &str, host: &str, port: Option<u16>) -> Result<(), String> {
        let key = (user.to_string(), host.to_string());
        let mut guard = self.masters.lock().await;
        if guard.contains_key(&key) {
            return Ok(());
        }

        std::fs::create_dir_all(&self.control_dir)
            .map_err(|e| format!("failed to create ssh control dir: {e}"))?;
        let control_path = self.control_path(user, host);

        let mut cmd = Command::new("ssh");
        cmd.arg("-N")
            .arg("-f")
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-o")
            .arg(format!("ControlPersist={}s", self.keepalive_secs.max(1)))
            .args(self.host_key_opts());
        if let Some(p) = port {
            cmd.arg("-p").arg(p.to_string());
        }
        cmd.arg(format!("{user}@{host}"));

        let output = cmd.output().await.map_err(|e| format!("failed to launch ssh master: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "ssh control-master setup failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        guard.insert(key, ());
        Ok(())
    }

    fn next_remote_path(&self, user: &str, host: &str) -> String {
        let n = self.remote_seq.fetch_add(1, Ordering::Relaxed);
        format!("/tmp/fz-run-{}-{}-{}", std::process::id(), n, fingerprint(user, host))
    }
}

fn fingerprint(user: &str, host: &str) -> String {
    format!("{user}_{host}").replace(['.', '@', ':'], "_")
}

/// Push `case_dir`, run `command` remotely with it as CWD, stream
/// stdout/stderr back, pull the directory, and clean up on success (spec
/// §4.4.2 steps 1-6).
pub async fn execute(
    pool: &SshPool,
    user: Option<&str>,
    host: &str,
    port: Option<u16>,
    command: &str,
    case_dir: &Path,
    cancellation: &Cancellation,
) -> BackendOutcome {
    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(command.to_string());
    }

    let user = user.unwrap_or("root");
    if let Err(e) = pool.ensure_master(user, host, port).await {
        return BackendOutcome::error(command.to_string(), e);
    }

    let control_path = pool.control_path(user, host);
    let remote_path = pool.next_remote_path(user, host);
    let destination = format!("{user}@{host}:{remote_path}");

    let control_opt = format!("ControlPath={}", control_path.display());

    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(command.to_string());
    }

    let mut push = Command::new("scp");
    push.arg("-o").arg(&control_opt).arg("-r");
    if let Some(p) = port {
        push.arg("-P").arg(p.to_string());
    }
    push.arg(format!("{}/.", case_dir.display())).arg(&destination);
    if let Err(e) = push.status().await {
        return BackendOutcome::error(command.to_string(), format!("scp push failed: {e}"));
    }

    let mut mkdir_guard = Command::new("ssh");
    mkdir_guard.arg("-o").arg(&control_opt);
    if let Some(p) = port {
        mkdir_guard.arg("-p").arg(p.to_string());
    }
    mkdir_guard.arg(format!("{user}@{host}")).arg(format!("mkdir -p {remote_path}"));
    let _ = mkdir_guard.status().await;

    let remote_command = format!("cd {remote_path} && {command}");
    let mut run = Command::new("ssh");
    run.arg("-o").arg(&control_opt);
    if let Some(p) = port {
        run.arg("-p").arg(p.to_string());
    }
    run.arg(format!("{user}@{host}")).arg(&remote_command);

    let start = SystemTime::now();
    let output = match run.output().await {
        Ok(o) => o,
        Err(e) => return BackendOutcome::error(remote_command, format!("ssh exec failed: {e}")),
    };
    let end = SystemTime::now();

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code().unwrap_or(1);

    let mut pull = Command::new("scp");
    pull.arg("-o").arg(&control_opt).arg("-r");
    if let Some(p) = port {
        pull.arg("-P").arg(p.to_string());
    }
    pull.arg(format!("{destination}/.")).arg(format!("{}/", case_dir.display()));
    let _ = pull.status().await;

    if let Err(e) = write_run_artifacts(case_dir, &stdout, &stderr, &remote_command, exit_code, start, end) {
        return BackendOutcome::error(remote_command, format!("failed to write run artifacts: {e}"));
    }

    if exit_code == 0 {
        let mut cleanup = Command::new("ssh");
        cleanup.arg("-o").arg(&control_opt);
        if let Some(p) = port {
            cleanup.arg("-p").arg(p.to_string());
        }
        cleanup.arg(format!("{user}@{host}")).arg(format!("rm -rf {remote_path}"));
        let _ = cleanup.status().await;
        BackendOutcome::done(remote_command)
    } else {
        BackendOutcome::error(
            remote_command,
            format!("remote command exited {exit_code}: {}", stderr.trim()),
        )
    }
}
