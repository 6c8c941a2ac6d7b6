//! Variable and formula token grammar over a Model's prefix/delimiter
//! configuration.

use fz_core::Model;
use regex::Regex;

/// A parsed variable token: `P Lopen NAME [~DEFAULT[;COMMENT[;BOUNDS]]] Lclose`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarToken {
    pub name: String,
    pub default: Option<String>,
    pub comment: Option<String>,
    pub bounds: Option<String>,
}

/// Build the regex matching variable tokens for a Model's var prefix/delim.
/// Delimited: `P<open>(.*?)<close>`. Bare: `P NAME` with a word boundary,
/// which can carry no default/comment/bounds since there is no closing
/// delimiter to terminate them.
pub fn variable_regex(model: &Model) -> Regex {
    token_regex(model.var_prefix, &model.var_delim)
}

pub fn formula_regex(model: &Model) -> Regex {
    token_regex(model.formula_prefix, &model.formula_delim)
}

fn token_regex(prefix: char, delim: &fz_core::Delim) -> Regex {
    let p = regex::escape(&prefix.to_string());
    if delim.is_bare() {
        Regex::new(&format!(r"{p}([A-Za-z_][A-Za-z0-9_]*)")).expect("bare token pattern compiles")
    } else {
        let open = regex::escape(&delim.open.unwrap().to_string());
        let close = regex::escape(&delim.close.unwrap().to_string());
        Regex::new(&format!(r"{p}{open}(.*?){close}")).expect("delimited token pattern compiles")
    }
}

/// Split a delimited variable token's inner content into
/// `NAME[~DEFAULT[;COMMENT[;BOUNDS]]]`.
pub fn parse_var_inner(inner: &str) -> VarToken {
    let (name_and_rest, has_tilde) = match inner.split_once('~') {
        Some((name, rest)) => (name, Some(rest)),
        None => (inner, None),
    };
    let name = name_and_rest.trim().to_string();

    match has_tilde {
        None => VarToken { name, default: None, comment: None, bounds: None },
        Some(rest) => {
            let mut parts = rest.splitn(3, ';');
            let default = parts.next().map(|s| s.to_string());
            let comment = parts.next().map(|s| s.to_string());
            let bounds = parts.next().map(|s| s.to_string());
            VarToken { name, default, comment, bounds }
        }
    }
}

/// Split a delimited formula token's inner content into `EXPR[|FORMAT]`.
/// `FORMAT` is recognized only when it matches the numeric pattern
/// `0(.0+)(E00)?`; a `|` that doesn't precede a valid format is left as
/// part of `EXPR` (the restricted grammar has no `|` operator, so this is
/// unambiguous in practice).
pub fn parse_formula_inner(inner: &str) -> (String, Option<String>) {
    if let Some((expr, maybe_format)) = inner.rsplit_once('|') {
        if is_numeric_format(maybe_format.trim()) {
            return (expr.trim().to_string(), Some(maybe_format.trim().to_string()));
        }
    }
    (inner.trim().to_string(), None)
}

fn is_numeric_format(s: &str) -> bool {
    let re = Regex::new(r"^0(\.0+)?(E00)?$").expect("static format pattern compiles");
    re.is_match(s)
}

/// Format a numeric value according to a `0(.0+)(E00)?` format string.
pub fn apply_format(value: f64, format: &str) -> String {
    let scientific = format.ends_with("E00");
    let mantissa_part = if scientific { &format[..format.len() - 3] } else { format };
    let decimals = mantissa_part.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0);

    if scientific {
        let exp_width = format[mantissa_part.len() + 1..].len().max(1);
        let rendered = format!("{:.*E}", decimals, value);
        let (mantissa, exponent) = rendered.split_once('E').unwrap_or((rendered.as_str(), "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(rest) => ('-', rest),
            None => ('+', exponent),
        };
        format!("{mantissa}E{sign}{digits:0>exp_width$}")
    } else {
        format!("{value:.decimals$}")
    }
}

/// Strip the prefix and delimiters off a variable token, leaving the bare
/// identifier, for rewriting formula EXPRs before evaluation.
pub fn bare_identifier(model: &Model, var_match: &str) -> String {
    let re = variable_regex(model);
    if let Some(caps) = re.captures(var_match) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        parse_var_inner(inner).name
    } else {
        var_match.to_string()
    }
}

/// Rewrite every variable token inside `expr` to its bare identifier, so
/// the evaluator sees `x` rather than `$x` or `$(x)`.
pub fn debracket_variables(model: &Model, expr: &str) -> String {
    let re = variable_regex(model);
    re.replace_all(expr, |caps: &regex::Captures| {
        if model.var_delim.is_bare() {
            caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default()
        } else {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            parse_var_inner(inner).name
        }
    })
    .into_owned()
}

/// Detect whether `content` contains a NUL byte, the binary-file sniff
/// used to silently skip non-text files during substitution and
/// discovery.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fz_core::Delim;

    fn default_model() -> Model {
        Model::default()
    }

    #[test]
    fn variable_regex_matches_delimited_token() {
        let model = default_model();
        let re = variable_regex(&model);
        let caps = re.captures("hello $(x) world").unwrap();
        assert_eq!(&caps[1], "x");
    }

    #[test]
    fn variable_regex_matches_token_with_default() {
        let model = default_model();
        let re = variable_regex(&model);
        let caps = re.captures("$(x~1.0;a comment;[0;10])").unwrap();
        let parsed = parse_var_inner(&caps[1]);
        assert_eq!(parsed.name, "x");
        assert_eq!(parsed.default.as_deref(), Some("1.0"));
        assert_eq!(parsed.comment.as_deref(), Some("a comment"));
        assert_eq!(parsed.bounds.as_deref(), Some("[0;10]"));
    }

    #[test]
    fn bare_mode_matches_identifier_without_delimiters() {
        let mut model = default_model();
        model.var_delim = Delim::bare();
        let re = variable_regex(&model);
        let caps = re.captures("value is $x here").unwrap();
        assert_eq!(&caps[1], "x");
    }

    #[test]
    fn formula_inner_splits_expr_and_format() {
        let (expr, format) = parse_formula_inner("PI * r ** 2 | 0.00");
        assert_eq!(expr, "PI * r ** 2");
        assert_eq!(format.as_deref(), Some("0.00"));
    }

    #[test]
    fn formula_inner_without_format_keeps_pipe_in_expr_if_not_numeric() {
        let (expr, format) = parse_formula_inner("a | b");
        assert_eq!(expr, "a | b");
        assert_eq!(format, None);
    }

    #[test]
    fn apply_format_fixed_decimals() {
        assert_eq!(apply_format(3.14159, "0.00"), "3.14");
    }

    #[test]
    fn apply_format_scientific() {
        assert_eq!(apply_format(12345.0, "0.0000E00"), "1.2345E+04");
    }

    #[test]
    fn apply_format_scientific_negative_exponent() {
        assert_eq!(apply_format(0.0012, "0.00E00"), "1.20E-03");
    }

    #[test]
    fn debracket_rewrites_variable_tokens_to_bare_names() {
        let model = default_model();
        let rewritten = debracket_variables(&model, "$(r) ** 2");
        assert_eq!(rewritten, "r ** 2");
    }

    #[test]
    fn looks_binary_detects_nul_byte() {
        assert!(looks_binary(b"hello\0world"));
        assert!(!looks_binary(b"hello world"));
    }
}
