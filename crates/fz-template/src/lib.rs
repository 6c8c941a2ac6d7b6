//! Template Compiler (C1): variable/formula substitution and case
//! enumeration over a template directory tree.

pub mod case_gen;
pub mod discover;
pub mod eval;
pub mod static_env;
pub mod substitute;
pub mod token;
pub mod walk;

use fz_core::{Case, CompiledCase, FzError, Model, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use discover::discover_variables;

/// Compile one case: apply `case`'s assignments to the template tree
/// rooted at `source`, writing the result under
/// `output_dir/<case-suffix>/` (or directly into `output_dir` when the
/// suffix is empty). Returns the compiled case directory plus its
/// `.fz_hash` manifest.
///
/// If a directory of the same name already exists it is renamed with a
/// timestamp suffix first — a CompiledCase directory is owned by the
/// engine and never silently overwritten or deleted.
pub fn compile_case(
    source: &Path,
    case: &Case,
    model: &Model,
    output_dir: &Path,
    timestamp_suffix: &str,
) -> Result<CompiledCase, FzError> {
    if !source.exists() {
        return Err(FzError::Input {
            message: format!("template source not found: {}", source.display()),
        });
    }

    let suffix = case.suffix();
    let case_dir = if suffix.is_empty() {
        output_dir.to_path_buf()
    } else {
        output_dir.join(&suffix)
    };

    if case_dir.exists() {
        let renamed = case_dir.with_file_name(format!(
            "{}_{}",
            case_dir.file_name().and_then(|n| n.to_str()).unwrap_or("prior"),
            timestamp_suffix
        ));
        std::fs::rename(&case_dir, &renamed).map_err(FzError::Io)?;
    }
    std::fs::create_dir_all(&case_dir).map_err(FzError::Io)?;

    let values: HashMap<String, Value> = case.assignments.iter().cloned().collect();
    let input_files = walk::files_relative(source).map_err(|e| FzError::Input { message: e.to_string() })?;

    for rel in &input_files {
        let src_path = if source.is_file() { source.to_path_buf() } else { source.join(rel) };
        let dst_path = case_dir.join(rel);
        if let Some(parent) = dst_path.parent() {
            std::fs::create_dir_all(parent).map_err(FzError::Io)?;
        }
        copy_transformed(&src_path, &dst_path, model, &values)?;
    }

    let hash_manifest = fz_hash::write_hash_manifest(&case_dir, &input_files)
        .map_err(|e| FzError::Structural { message: e.to_string() })?;

    Ok(CompiledCase {
        case: case.clone(),
        dir: case_dir,
        hash_manifest,
    })
}

/// Apply the same case to every file under `source`, returning one
/// [`CompiledCase`] per emitted case.
pub fn compile_cases(
    source: &Path,
    cases: &[Case],
    model: &Model,
    output_dir: &Path,
    timestamp_suffix: &str,
) -> Result<Vec<CompiledCase>, FzError> {
    cases
        .iter()
        .map(|case| compile_case(source, case, model, output_dir, timestamp_suffix))
        .collect()
}

fn copy_transformed(
    src: &Path,
    dst: &Path,
    model: &Model,
    values: &HashMap<String, Value>,
) -> Result<(), FzError> {
    let bytes = std::fs::read(src).map_err(FzError::Io)?;
    if token::looks_binary(&bytes) {
        std::fs::write(dst, &bytes).map_err(FzError::Io)?;
        return Ok(());
    }

    let Ok(text) = String::from_utf8(bytes.clone()) else {
        // Non-UTF-8 but not NUL-sniffed binary: treat as binary per §4.1.
        std::fs::write(dst, &bytes).map_err(FzError::Io)?;
        return Ok(());
    };

    let static_env = static_env::parse_static_objects(&text, model);
    let with_formulas = substitute::substitute_formulas(model, &text, &static_env, values);
    let with_vars = substitute::substitute_variables(model, &with_formulas, values);
    std::fs::write(dst, with_vars).map_err(FzError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fz_core::Value;
    use tempfile::tempdir;

    #[test]
    fn compiles_single_case_with_variable_substitution() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("model.inp"), "x=$(x)\n").unwrap();
        let out = tempdir().unwrap();

        let model = Model::default();
        let case = Case::new(vec![("x".to_string(), Value::Int(1))]);
        let compiled = compile_case(src.path(), &case, &model, out.path(), "2026-01-01_00-00-00").unwrap();

        let content = std::fs::read_to_string(compiled.dir.join("model.inp")).unwrap();
        assert_eq!(content, "x=1\n");
        assert!(compiled.dir.join(".fz_hash").exists());
    }

    #[test]
    fn case_suffix_names_the_output_directory() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("model.inp"), "x=$(x)\n").unwrap();
        let out = tempdir().unwrap();

        let model = Model::default();
        let case = Case::new(vec![("x".to_string(), Value::Int(1))]);
        let compiled = compile_case(src.path(), &case, &model, out.path(), "ts").unwrap();

        assert_eq!(compiled.dir, out.path().join("x=1"));
    }

    #[test]
    fn empty_case_compiles_directly_into_output_dir() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("model.inp"), "fixed\n").unwrap();
        let out = tempdir().unwrap();

        let model = Model::default();
        let case = Case::default();
        let compiled = compile_case(src.path(), &case, &model, out.path(), "ts").unwrap();

        assert_eq!(compiled.dir, out.path());
    }

    #[test]
    fn preexisting_case_dir_is_renamed_not_deleted() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("model.inp"), "x=$(x)\n").unwrap();
        let out = tempdir().unwrap();

        let model = Model::default();
        let case = Case::new(vec![("x".to_string(), Value::Int(1))]);
        std::fs::create_dir_all(out.path().join("x=1")).unwrap();
        std::fs::write(out.path().join("x=1").join("sentinel"), "keep me").unwrap();

        compile_case(src.path(), &case, &model, out.path(), "2026-02-02_03-04-05").unwrap();

        let renamed = out.path().join("x=1_2026-02-02_03-04-05");
        assert!(renamed.join("sentinel").exists());
    }

    #[test]
    fn binary_file_copied_verbatim() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("data.bin"), [0u8, 1, 2, 3]).unwrap();
        let out = tempdir().unwrap();

        let model = Model::default();
        let case = Case::default();
        let compiled = compile_case(src.path(), &case, &model, out.path(), "ts").unwrap();

        let copied = std::fs::read(compiled.dir.join("data.bin")).unwrap();
        assert_eq!(copied, vec![0u8, 1, 2, 3]);
    }

    #[test]
    fn missing_source_fails() {
        let out = tempdir().unwrap();
        let model = Model::default();
        let case = Case::default();
        let result = compile_case(Path::new("/nonexistent/src"), &case, &model, out.path(), "ts");
        assert!(result.is_err());
    }

    #[test]
    fn compile_cases_produces_one_dir_per_case() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("model.inp"), "x=$(x)\n").unwrap();
        let out = tempdir().unwrap();

        let model = Model::default();
        let cases = vec![
            Case::new(vec![("x".to_string(), Value::Int(1))]),
            Case::new(vec![("x".to_string(), Value::Int(2))]),
        ];
        let compiled = compile_cases(src.path(), &cases, &model, out.path(), "ts").unwrap();
        assert_eq!(compiled.len(), 2);
        assert_ne!(compiled[0].dir, compiled[1].dir);
    }
}
