//! Local-shell calculator (`sh://`).

use crate::common::{write_run_artifacts, BackendOutcome};
use fz_core::Cancellation;
use fz_process::ShellPathResolver;
use std::path::Path;
use std::time::SystemTime;
use tokio::process::Command;

const SHELL_OPERATORS: &[&str] = &["|", ">", ">>", "<", "&&", "||", ";", "&"];

/// Run `command` with `case_dir` as CWD. Before execution, relative-path
/// tokens that resolve to an existing file against `submitter_cwd` are
/// made absolute, and bare command names are rewritten against
/// `shell_path`. Flags and shell operators are left alone.
pub async fn execute(
    command: &str,
    case_dir: &Path,
    submitter_cwd: &Path,
    shell_path: &ShellPathResolver,
    cancellation: &Cancellation,
) -> BackendOutcome {
    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(command.to_string());
    }

    let expanded = expand_relative_paths(command, submitter_cwd);
    let rewritten = shell_path.rewrite_commands(&expanded);

    let mut cmd = Command::new(bash_binary());
    cmd.arg("-c").arg(&rewritten).current_dir(case_dir);

    let start = SystemTime::now();
    let outcome = fz_process::spawn(cmd).await;

    let mut child = match outcome {
        Ok(child) => child,
        Err(e) => return BackendOutcome::error(rewritten, format!("failed to spawn: {e}")),
    };

    if cancellation.is_cancelled() {
        fz_process::kill_process_group(&mut child);
        let _ = child.wait().await;
        return BackendOutcome::cancelled(rewritten);
    }

    let result = match fz_process::wait_and_capture(child, std::time::Duration::from_secs(
        fz_process::DEFAULT_IDLE_TIMEOUT_SECS,
    ))
    .await
    {
        Ok(r) => r,
        Err(e) => return BackendOutcome::error(rewritten, format!("failed to wait for child: {e}")),
    };

    let end = SystemTime::now();
    if let Err(e) =
        write_run_artifacts(case_dir, &result.stdout, &result.stderr, &rewritten, result.exit_code, start, end)
    {
        return BackendOutcome::error(rewritten, format!("failed to write run artifacts: {e}"));
    }

    if cancellation.is_cancelled() {
        return BackendOutcome::cancelled(rewritten);
    }

    if result.exit_code == 0 {
        BackendOutcome::done(rewritten)
    } else {
        BackendOutcome::error(
            rewritten.clone(),
            format!("exited with status {}: {}", result.exit_code, result.stderr.trim()),
        )
    }
}

/// Lexical relative-path expansion: any whitespace-separated token that is
/// not a flag (`-...`) or a shell operator, and that names an existing
/// file when resolved against `submitter_cwd`, is rewritten to its
/// absolute form.
fn expand_relative_paths(command: &str, submitter_cwd: &Path) -> String {
    command
        .split(' ')
        .map(|token| {
            if token.is_empty() || token.starts_with('-') || SHELL_OPERATORS.contains(&token) {
                return token.to_string();
            }
            let candidate = submitter_cwd.join(token);
            if candidate.is_file() {
                candidate.to_string_lossy().into_owned()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(unix)]
fn bash_binary() -> &'static str {
    "bash"
}

#[cfg(not(unix))]
fn bash_binary() -> &'static str {
    "bash.exe"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BackendStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn runs_command_and_reports_done() {
        let case_dir = tempdir().unwrap();
        let cwd = tempdir().unwrap();
        let resolver = ShellPathResolver::new(None);
        let cancellation = Cancellation::new();

        let outcome = execute(
            "echo hello > out_marker.txt",
            case_dir.path(),
            cwd.path(),
            &resolver,
            &cancellation,
        )
        .await;

        assert_eq!(outcome.status, BackendStatus::Done);
        assert!(case_dir.path().join("out.txt").exists());
        assert!(case_dir.path().join("log.txt").exists());
    }

    #[tokio::test]
    async fn nonzero_exit_reports_error() {
        let case_dir = tempdir().unwrap();
        let cwd = tempdir().unwrap();
        let resolver = ShellPathResolver::new(None);
        let cancellation = Cancellation::new();

        let outcome = execute("exit 2", case_dir.path(), cwd.path(), &resolver, &cancellation).await;
        assert_eq!(outcome.status, BackendStatus::Error);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_spawns() {
        let case_dir = tempdir().unwrap();
        let cwd = tempdir().unwrap();
        let resolver = ShellPathResolver::new(None);
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let outcome = execute("echo hi", case_dir.path(), cwd.path(), &resolver, &cancellation).await;
        assert_eq!(outcome.status, BackendStatus::Error);
        assert_eq!(outcome.err.as_deref(), Some("cancelled"));
        assert!(!case_dir.path().join("out.txt").exists());
    }

    #[test]
    fn expand_relative_paths_rewrites_existing_file_token() {
        let cwd = tempdir().unwrap();
        std::fs::write(cwd.path().join("script.sh"), "#!/bin/sh\n").unwrap();

        let rewritten = expand_relative_paths("bash script.sh -x", cwd.path());
        assert!(rewritten.contains(&cwd.path().join("script.sh").to_string_lossy().into_owned()));
        assert!(rewritten.contains("-x"));
    }

    #[test]
    fn expand_relative_paths_never_touches_flags_or_operators() {
        let cwd = tempdir().unwrap();
        let rewritten = expand_relative_paths("grep -v foo | sort", cwd.path());
        assert_eq!(rewritten, "grep -v foo | sort");
    }
}
