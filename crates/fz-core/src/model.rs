use serde::Deserialize;
use std::collections::HashMap;

/// Formula interpreter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpreter {
    #[default]
    Python,
    #[serde(rename = "R")]
    R,
    Javascript,
    Auto,
}

impl std::str::FromStr for Interpreter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" => Ok(Interpreter::Python),
            "r" => Ok(Interpreter::R),
            "javascript" | "js" => Ok(Interpreter::Javascript),
            "auto" => Ok(Interpreter::Auto),
            other => Err(format!(
                "invalid interpreter '{other}': must be one of python, R, javascript, auto"
            )),
        }
    }
}

impl Interpreter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpreter::Python => "python",
            Interpreter::R => "R",
            Interpreter::Javascript => "javascript",
            Interpreter::Auto => "auto",
        }
    }
}

/// A delimiter pair for variable/formula tokens: either empty (bare
/// identifier) or exactly two characters (open, close).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delim {
    pub open: Option<char>,
    pub close: Option<char>,
}

impl Delim {
    pub fn bare() -> Self {
        Self {
            open: None,
            close: None,
        }
    }

    pub fn from_pair(s: &str) -> Self {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(o), Some(c)) => Delim {
                open: Some(o),
                close: Some(c),
            },
            _ => Delim::bare(),
        }
    }

    pub fn is_bare(&self) -> bool {
        self.open.is_none()
    }
}

/// A configuration describing how to parse templates and extract outputs.
/// Immutable for the duration of one engine invocation.
#[derive(Debug, Clone)]
pub struct Model {
    pub var_prefix: char,
    pub var_delim: Delim,
    pub formula_prefix: char,
    pub formula_delim: Delim,
    pub comment_line: String,
    pub interpreter: Interpreter,
    /// Ordered map from output-name to shell pipeline string.
    pub output: Vec<(String, String)>,
    /// Variables bound to vary together as one ordered tuple per step,
    /// rather than via the Cartesian product.
    pub group_variables: Vec<Vec<String>>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            var_prefix: '$',
            var_delim: Delim::from_pair("()"),
            formula_prefix: '@',
            formula_delim: Delim::from_pair("{}"),
            comment_line: "#".to_string(),
            interpreter: Interpreter::Python,
            output: Vec::new(),
            group_variables: Vec::new(),
        }
    }
}

/// Raw, synonym-tolerant deserialization shape. Every Model field MUST
/// accept multiple spellings (e.g. `varprefix`/`var_prefix`/`var_char`).
#[derive(Debug, Deserialize, Default)]
struct RawModel {
    #[serde(alias = "varprefix", alias = "var_char")]
    var_prefix: Option<String>,
    #[serde(alias = "vardelim", alias = "var_brackets")]
    var_delim: Option<String>,
    #[serde(alias = "formulaprefix", alias = "formula_char")]
    formula_prefix: Option<String>,
    #[serde(alias = "formuladelim", alias = "formula_brackets")]
    formula_delim: Option<String>,
    #[serde(alias = "commentline", alias = "comment")]
    comment_line: Option<String>,
    #[serde(alias = "lang")]
    interpreter: Option<String>,
    #[serde(default)]
    output: HashMap<String, String>,
    /// Preserves insertion order for the `output` map when the source is a
    /// TOML/JSON document that supports ordered tables; callers that need a
    /// guaranteed order should populate `output_order` explicitly.
    #[serde(default)]
    output_order: Vec<String>,
    #[serde(default, alias = "groupvariables")]
    group_variables: Vec<Vec<String>>,
}

impl Model {
    /// Parse a Model from a raw key/value mapping, honoring every documented
    /// field synonym. Unrecognized keys are ignored (forward compatibility).
    pub fn from_raw(raw: &HashMap<String, serde_json::Value>) -> Result<Self, crate::FzError> {
        let json = serde_json::to_value(raw).map_err(|e| crate::FzError::Input {
            message: format!("invalid model document: {e}"),
        })?;
        let raw: RawModel = serde_json::from_value(json).map_err(|e| crate::FzError::Input {
            message: format!("invalid model document: {e}"),
        })?;

        let mut model = Model::default();

        if let Some(p) = raw.var_prefix {
            model.var_prefix = p.chars().next().unwrap_or('$');
        }
        if let Some(d) = raw.var_delim {
            model.var_delim = if d.is_empty() {
                Delim::bare()
            } else {
                Delim::from_pair(&d)
            };
        }
        if let Some(p) = raw.formula_prefix {
            model.formula_prefix = p.chars().next().unwrap_or('@');
        }
        if let Some(d) = raw.formula_delim {
            model.formula_delim = if d.is_empty() {
                Delim::bare()
            } else {
                Delim::from_pair(&d)
            };
        }
        if let Some(c) = raw.comment_line {
            model.comment_line = c;
        }
        if let Some(i) = raw.interpreter {
            model.interpreter = i.parse().map_err(|e| crate::FzError::Input { message: e })?;
        }
        model.group_variables = raw.group_variables;

        if !raw.output_order.is_empty() {
            model.output = raw
                .output_order
                .iter()
                .filter_map(|k| raw.output.get(k).map(|v| (k.clone(), v.clone())))
                .collect();
        } else {
            let mut entries: Vec<(String, String)> = raw.output.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            model.output = entries;
        }

        Ok(model)
    }
}
