//! Subprocess spawn/capture primitives shared by every calculator backend
//! that runs a real binary (`sh://`, `ssh://`'s local `ssh`/`scp` spawns,
//! and the shell-pipeline output extractor).

pub mod shell_path;

use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::warn;

pub use shell_path::ShellPathResolver;

/// Result of executing a command to completion.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub idle_timed_out: bool,
}

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Spawn a command, isolating it in its own process group (Unix `setsid`)
/// so the whole tree can be killed on cancellation or idle timeout.
pub async fn spawn(mut cmd: Command) -> Result<tokio::process::Child> {
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    // SAFETY: setsid() is async-signal-safe and runs before exec.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.spawn().context("failed to spawn command")
}

/// Wait for a spawned child, capturing stdout/stderr and enforcing an
/// idle-timeout: the process is killed only when neither stream has
/// produced output for the full `idle_timeout` duration. A `None` timeout
/// disables the idle check (only used for tests with very short sleeps).
pub async fn wait_and_capture(
    mut child: tokio::process::Child,
    idle_timeout: Duration,
) -> Result<ExecutionResult> {
    let stdout = child.stdout.take().context("child has no stdout handle")?;
    let stderr = child.stderr.take().context("child has no stderr handle")?;

    let mut stdout_reader = BufReader::new(stdout);
    let mut stderr_reader = BufReader::new(stderr);

    let mut stdout_buf = [0u8; 4096];
    let mut stderr_buf = [0u8; 4096];
    let mut stdout_out = Vec::new();
    let mut stderr_out = Vec::new();

    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut last_activity = Instant::now();
    let mut idle_timed_out = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            result = stdout_reader.read(&mut stdout_buf), if !stdout_done => {
                match result {
                    Ok(0) => stdout_done = true,
                    Ok(n) => {
                        last_activity = Instant::now();
                        stdout_out.extend_from_slice(&stdout_buf[..n]);
                    }
                    Err(_) => stdout_done = true,
                }
            }
            result = stderr_reader.read(&mut stderr_buf), if !stderr_done => {
                match result {
                    Ok(0) => stderr_done = true,
                    Ok(n) => {
                        last_activity = Instant::now();
                        stderr_out.extend_from_slice(&stderr_buf[..n]);
                    }
                    Err(_) => stderr_done = true,
                }
            }
            _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {
                if last_activity.elapsed() >= idle_timeout {
                    idle_timed_out = true;
                    warn!(timeout_secs = idle_timeout.as_secs(), "killing child: idle timeout");
                    kill_process_group(&mut child);
                    break;
                }
            }
        }
    }

    let status = child.wait().await.context("failed to wait for child")?;
    let exit_code = if idle_timed_out {
        137
    } else {
        status.code().unwrap_or(1)
    };

    Ok(ExecutionResult {
        stdout: String::from_utf8_lossy(&stdout_out).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_out).into_owned(),
        exit_code,
        idle_timed_out,
    })
}

/// Convenience: spawn and wait with the default idle timeout.
pub async fn run_and_capture(cmd: Command) -> Result<ExecutionResult> {
    let child = spawn(cmd).await?;
    wait_and_capture(child, Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)).await
}

/// Kill the whole process group a child belongs to (it was started with
/// `setsid`, so its pid is also its process-group id).
pub fn kill_process_group(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill() is async-signal-safe; negative pid targets the group.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
            return;
        }
    }
    let _ = child.start_kill();
}

/// Send SIGTERM to a process group, for the cancellation grace period
/// before the hard `kill_process_group` SIGKILL escalation (§5).
pub fn terminate_process_group(child: &tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(-(pid as i32), libc::SIGTERM);
            }
        }
    }
}

/// Check whether an executable can be located, either via the configured
/// shell path or the system `PATH`.
pub fn check_tool_installed(executable: &str, resolver: &ShellPathResolver) -> bool {
    resolver.resolve_command(executable).is_some() || which::which(executable).is_ok()
}

/// Write `log.txt` for a calculator backend run, per the §4.4 common
/// contract: command, exit code, start/end timestamps, duration, user,
/// hostname, OS, original cwd.
pub fn write_log_file(
    dir: &Path,
    command: &str,
    exit_code: i32,
    start: std::time::SystemTime,
    end: std::time::SystemTime,
    duration: Duration,
) -> std::io::Result<()> {
    let hostname = hostname_best_effort();
    let user = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_default();
    let cwd = std::env::current_dir().unwrap_or_default();

    let start_secs = start
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let end_secs = end
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let contents = format!(
        "command: {command}\nexit_code: {exit_code}\nstart: {start_secs}\nend: {end_secs}\nduration_s: {:.3}\nuser: {user}\nhostname: {hostname}\nos: {os}\ncwd: {cwd}\n",
        duration.as_secs_f64(),
        os = std::env::consts::OS,
        cwd = cwd.display(),
    );
    std::fs::write(dir.join("log.txt"), contents)
}

fn hostname_best_effort() -> String {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
