//! Variable discovery (`fzi`): scan a template tree for variable and
//! formula tokens without substituting, returning name -> default value.

use crate::token;
use crate::walk;
use fz_core::{FzError, Model, Value};
use std::collections::HashMap;
use std::path::Path;

/// Discover every variable and formula token under `source`. Formula
/// entries are keyed by their de-prefixed expression and always map to
/// `Value::Null` (their value depends on case-specific variable bindings,
/// not known at discovery time). Binary files are skipped silently.
pub fn discover_variables(source: &Path, model: &Model) -> Result<HashMap<String, Value>, FzError> {
    if !source.exists() {
        return Err(FzError::Input {
            message: format!("template source not found: {}", source.display()),
        });
    }

    let mut discovered: HashMap<String, Value> = HashMap::new();
    let var_re = token::variable_regex(model);
    let formula_re = token::formula_regex(model);

    let files = walk::files_relative(source).map_err(|e| FzError::Input { message: e.to_string() })?;
    for rel in files {
        let abs = if source.is_file() { source.to_path_buf() } else { source.join(&rel) };
        let bytes = std::fs::read(&abs).map_err(FzError::Io)?;
        if token::looks_binary(&bytes) {
            continue;
        }
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };

        for caps in var_re.captures_iter(&text) {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let parsed = token::parse_var_inner(inner);
            let value = match &parsed.default {
                Some(raw) => Value::cast_from_str(raw),
                None => Value::Null,
            };
            discovered.entry(parsed.name).or_insert(value);
        }

        for caps in formula_re.captures_iter(&text) {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let (expr, _format) = token::parse_formula_inner(inner);
            discovered.entry(expr).or_insert(Value::Null);
        }
    }

    Ok(discovered)
}
