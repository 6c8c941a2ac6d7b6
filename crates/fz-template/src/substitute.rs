//! Variable and formula substitution over a single file's text content.
//! Directory-tree walking lives in `compile.rs`.

use crate::eval;
use crate::static_env::StaticObjectEnv;
use crate::token;
use fz_core::{Interpreter, Model, Value};
use std::collections::HashMap;
use std::process::Command;

/// Replace every variable token with its assigned value's string form.
/// Variables with no assignment are left unchanged.
pub fn substitute_variables(model: &Model, content: &str, values: &HashMap<String, Value>) -> String {
    let re = token::variable_regex(model);
    re.replace_all(content, |caps: &regex::Captures| {
        let full = caps.get(0).unwrap().as_str();
        let name = if model.var_delim.is_bare() {
            caps.get(1).unwrap().as_str().to_string()
        } else {
            token::parse_var_inner(caps.get(1).unwrap().as_str()).name
        };
        match values.get(&name) {
            Some(v) => v.to_string(),
            None => full.to_string(),
        }
    })
    .into_owned()
}

/// Replace every formula token with its evaluated, optionally formatted,
/// result. Evaluation failures leave the FORMAT string literally (if
/// present) or the original token unchanged, and never abort the caller.
pub fn substitute_formulas(
    model: &Model,
    content: &str,
    static_env: &StaticObjectEnv,
    values: &HashMap<String, Value>,
) -> String {
    let re = token::formula_regex(model);
    re.replace_all(content, |caps: &regex::Captures| {
        let full = caps.get(0).unwrap().as_str();
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let (expr, format) = token::parse_formula_inner(inner);
        let debracketed = token::debracket_variables(model, &expr);

        let mut vars_f64: HashMap<String, f64> = values
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
            .collect();
        for (k, v) in &static_env.vars {
            vars_f64.entry(k.clone()).or_insert(*v);
        }

        match eval_expr(model, static_env, &debracketed, &vars_f64) {
            Ok(value) => match &format {
                Some(fmt) => token::apply_format(value, fmt),
                None => default_number_string(value),
            },
            Err(reason) => {
                tracing::warn!(expr = %debracketed, %reason, "formula evaluation failed");
                format.unwrap_or_else(|| full.to_string())
            }
        }
    })
    .into_owned()
}

fn default_number_string(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn eval_expr(
    model: &Model,
    static_env: &StaticObjectEnv,
    expr: &str,
    vars: &HashMap<String, f64>,
) -> Result<f64, String> {
    match model.interpreter {
        Interpreter::Auto => eval::evaluate(expr, vars).map_err(|e| e.to_string()),
        Interpreter::Python => shell_out_numeric("python3", python_script(static_env, vars, expr)),
        Interpreter::R => shell_out_numeric("Rscript", r_script(static_env, vars, expr)),
        Interpreter::Javascript => {
            Err("javascript interpreter is not available in this build".to_string())
        }
    }
}

fn python_script(static_env: &StaticObjectEnv, vars: &HashMap<String, f64>, expr: &str) -> String {
    let mut lines: Vec<String> = vars.iter().map(|(k, v)| format!("{k} = {v}")).collect();
    lines.extend(static_env.raw_code.iter().cloned());
    lines.push(format!("print({expr})"));
    lines.join("\n")
}

fn r_script(static_env: &StaticObjectEnv, vars: &HashMap<String, f64>, expr: &str) -> String {
    let mut lines: Vec<String> = vars.iter().map(|(k, v)| format!("{k} <- {v}")).collect();
    lines.extend(static_env.raw_code.iter().map(|l| l.replace('=', "<-")));
    lines.push(format!("cat({expr})"));
    lines.join("\n")
}

fn shell_out_numeric(interpreter: &str, script: String) -> Result<f64, String> {
    let arg = if interpreter == "Rscript" { "-e" } else { "-c" };
    let output = Command::new(interpreter)
        .arg(arg)
        .arg(&script)
        .output()
        .map_err(|e| format!("failed to launch {interpreter}: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "{interpreter} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("non-numeric {interpreter} output: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fz_core::Value;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn substitutes_assigned_variable() {
        let model = Model::default();
        let out = substitute_variables(&model, "radius = $(r)", &values(&[("r", Value::Int(5))]));
        assert_eq!(out, "radius = 5");
    }

    #[test]
    fn leaves_unassigned_variable_unchanged() {
        let model = Model::default();
        let out = substitute_variables(&model, "radius = $(r)", &values(&[]));
        assert_eq!(out, "radius = $(r)");
    }

    #[test]
    fn substitutes_formula_with_auto_interpreter() {
        let mut model = Model::default();
        model.interpreter = Interpreter::Auto;
        let static_env = StaticObjectEnv::default();
        let out = substitute_formulas(
            &model,
            "area = @{$(r) ** 2 * 3.14159 | 0.00}",
            &static_env,
            &values(&[("r", Value::Int(2))]),
        );
        assert_eq!(out, "area = 12.57");
    }

    #[test]
    fn formula_failure_leaves_token_unchanged_without_format() {
        let mut model = Model::default();
        model.interpreter = Interpreter::Auto;
        let static_env = StaticObjectEnv::default();
        let out = substitute_formulas(&model, "@{unknown_var}", &static_env, &values(&[]));
        assert_eq!(out, "@{unknown_var}");
    }

    #[test]
    fn formula_failure_emits_format_literally_when_present() {
        let mut model = Model::default();
        model.interpreter = Interpreter::Auto;
        let static_env = StaticObjectEnv::default();
        let out = substitute_formulas(&model, "@{unknown_var | 0.00}", &static_env, &values(&[]));
        assert_eq!(out, "0.00");
    }

    #[test]
    fn default_number_string_drops_trailing_zero_for_integral_results() {
        assert_eq!(default_number_string(4.0), "4");
        assert_eq!(default_number_string(4.5), "4.5");
    }
}
