//! The common backend contract shared by every calculator variant (spec
//! §4.4): write `out.txt`/`err.txt`/`log.txt`, honor cancellation.

use std::path::Path;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Done,
    Cached,
    Error,
}

/// What one calculator variant's `execute()` returns: the common contract
/// shared by every backend, before extraction or retry classification
/// happen in the dispatcher (fz-scheduler).
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub status: BackendStatus,
    pub command_ran: String,
    pub err: Option<String>,
}

impl BackendOutcome {
    pub fn done(command_ran: String) -> Self {
        Self { status: BackendStatus::Done, command_ran, err: None }
    }

    pub fn cached(command_ran: String) -> Self {
        Self { status: BackendStatus::Cached, command_ran, err: None }
    }

    pub fn error(command_ran: String, err: impl Into<String>) -> Self {
        Self { status: BackendStatus::Error, command_ran, err: Some(err.into()) }
    }

    pub fn cancelled(command_ran: String) -> Self {
        Self::error(command_ran, "cancelled")
    }
}

/// Write `out.txt`, `err.txt`, and `log.txt` inside `case_dir`, per the
/// §4.4 common contract.
pub fn write_run_artifacts(
    case_dir: &Path,
    stdout: &str,
    stderr: &str,
    command: &str,
    exit_code: i32,
    start: SystemTime,
    end: SystemTime,
) -> std::io::Result<()> {
    std::fs::write(case_dir.join("out.txt"), stdout)?;
    std::fs::write(case_dir.join("err.txt"), stderr)?;
    fz_process::write_log_file(
        case_dir,
        command,
        exit_code,
        start,
        end,
        end.duration_since(start).unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_run_artifacts_creates_all_three_files() {
        let dir = tempdir().unwrap();
        let now = SystemTime::now();
        write_run_artifacts(dir.path(), "out", "err", "echo hi", 0, now, now).unwrap();
        assert!(dir.path().join("out.txt").exists());
        assert!(dir.path().join("err.txt").exists());
        assert!(dir.path().join("log.txt").exists());
    }

    #[test]
    fn outcome_constructors_set_expected_status() {
        assert_eq!(BackendOutcome::done("x".into()).status, BackendStatus::Done);
        assert_eq!(BackendOutcome::cached("x".into()).status, BackendStatus::Cached);
        let err = BackendOutcome::error("x".into(), "boom");
        assert_eq!(err.status, BackendStatus::Error);
        assert_eq!(err.err.as_deref(), Some("boom"));
    }

    #[test]
    fn cancelled_outcome_carries_cancelled_note() {
        let outcome = BackendOutcome::cancelled("x".into());
        assert_eq!(outcome.err.as_deref(), Some("cancelled"));
    }
}
