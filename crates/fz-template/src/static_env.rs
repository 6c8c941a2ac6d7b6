//! Static-object directives: `<comment_line> <formula_prefix> : <code>`
//! constants evaluated once per file into an environment shared by every
//! formula token in that file. The restricted evaluator handles simple
//! constants directly; raw lines are retained for the explicit
//! python3/Rscript shell-out path for anything more involved.

use crate::eval;
use fz_core::Model;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct StaticObjectEnv {
    /// Constants resolved by the built-in evaluator, available to every
    /// formula in the same file.
    pub vars: HashMap<String, f64>,
    /// Raw code lines in source order, for the explicit Python/R
    /// interpreter path which shells out with the real language.
    pub raw_code: Vec<String>,
}

/// Scan `content` line by line for static-object (`:`), unit-test (`?`,
/// ignored), and plain-comment directives.
pub fn parse_static_objects(content: &str, model: &Model) -> StaticObjectEnv {
    let mut env = StaticObjectEnv::default();
    let static_prefix = format!("{}{}:", model.comment_line, model.formula_prefix);
    let unittest_prefix = format!("{}{}?", model.comment_line, model.formula_prefix);
    let assign_re = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("static pattern");

    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(code) = trimmed.strip_prefix(&static_prefix) {
            let code = code.trim().to_string();
            if let Some(caps) = assign_re.captures(&code) {
                let name = caps[1].to_string();
                let expr = &caps[2];
                if let Ok(value) = eval::evaluate(expr, &env.vars) {
                    env.vars.insert(name, value);
                }
            }
            env.raw_code.push(code);
        } else if trimmed.starts_with(&unittest_prefix) {
            // unit-test directive, ignored by the compiler
        }
    }

    env
}
