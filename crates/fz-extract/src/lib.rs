//! Output Extractor: run per-output shell pipelines inside a
//! finished case directory and cast the results.

use fz_core::{FzError, Model, Value};
use fz_process::ShellPathResolver;
use std::path::Path;
use tokio::process::Command;

/// One output's extraction outcome: the cast value (`Value::Null` on
/// empty stdout or non-zero exit) plus an optional error note recorded
/// for diagnostics without failing the whole extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractedOutput {
    pub name: String,
    pub value: Value,
    pub error: Option<String>,
}

/// Run every `(name, pipeline)` pair in `model.output` with `case_dir` as
/// CWD, in declared order. A failing pipeline never aborts extraction of
/// the remaining outputs.
pub async fn extract_outputs(
    case_dir: &Path,
    model: &Model,
    shell_path: &ShellPathResolver,
) -> Result<Vec<ExtractedOutput>, FzError> {
    let mut results = Vec::with_capacity(model.output.len());
    for (name, pipeline) in &model.output {
        results.push(extract_one(case_dir, name, pipeline, shell_path).await);
    }
    Ok(results)
}

async fn extract_one(
    case_dir: &Path,
    name: &str,
    pipeline: &str,
    shell_path: &ShellPathResolver,
) -> ExtractedOutput {
    let rewritten = shell_path.rewrite_commands(pipeline);

    let mut cmd = Command::new(bash_binary());
    cmd.arg("-c").arg(&rewritten).current_dir(case_dir);

    let outcome = fz_process::run_and_capture(cmd).await;

    match outcome {
        Ok(result) if result.exit_code == 0 => ExtractedOutput {
            name: name.to_string(),
            value: Value::cast_from_str(&result.stdout),
            error: None,
        },
        Ok(result) => {
            let note = format!(
                "extraction pipeline exited {}: {}",
                result.exit_code,
                result.stderr.trim()
            );
            tracing::warn!(output = name, %note, "extraction failed");
            ExtractedOutput {
                name: name.to_string(),
                value: Value::Null,
                error: Some(note),
            }
        }
        Err(e) => {
            let note = format!("failed to launch extraction pipeline: {e}");
            tracing::warn!(output = name, %note, "extraction failed");
            ExtractedOutput {
                name: name.to_string(),
                value: Value::Null,
                error: Some(note),
            }
        }
    }
}

/// All outputs null is treated as a case failure; any single null among
/// others is not.
pub fn all_null(outputs: &[ExtractedOutput]) -> bool {
    !outputs.is_empty() && outputs.iter().all(|o| o.value.is_null())
}

/// Any null value among the extracted outputs — the condition the
/// dispatcher and the cache's None-output invalidation both test for.
pub fn any_null(outputs: &[ExtractedOutput]) -> bool {
    outputs.iter().any(|o| o.value.is_null())
}

#[cfg(unix)]
fn bash_binary() -> &'static str {
    "bash"
}

#[cfg(not(unix))]
fn bash_binary() -> &'static str {
    "bash.exe"
}
