//! TOML run-spec loading for the CLI. Parsing the run-spec file is CLI
//! plumbing, not part of the engine's contract: load with `toml::from_str`
//! and wrap errors with `anyhow::Context` for a readable message.

use anyhow::{Context, Result};
use fz_core::{Model, Value};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, serde::Deserialize)]
pub struct RunSpec {
    pub template: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default)]
    pub model: toml::value::Table,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub rows: Option<TableRows>,
    #[serde(default)]
    pub group_variables: Vec<Vec<String>>,
    #[serde(default)]
    pub calculators: Vec<String>,
    #[serde(default)]
    pub driver: Option<DriverSpec>,
}

#[derive(Debug, serde::Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub values: Vec<toml::Value>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<toml::Value>>,
}

#[derive(Debug, serde::Deserialize)]
pub struct DriverSpec {
    pub output_expression: String,
    #[serde(default)]
    pub input_ranges: HashMap<String, (f64, f64)>,
    #[serde(default)]
    pub fixed_vars: HashMap<String, f64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_batch_size() -> usize {
    4
}

fn default_max_iterations() -> usize {
    10
}

impl RunSpec {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run spec: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse run spec: {}", path.display()))
    }

    pub fn model(&self) -> Result<Model> {
        let json = serde_json::to_value(toml::Value::Table(self.model.clone()))
            .context("model section is not valid TOML")?;
        let map: HashMap<String, serde_json::Value> =
            serde_json::from_value(json).context("model section must be a table")?;
        Model::from_raw(&map).context("invalid model document")
    }

    pub fn calculator_uris(&self) -> Result<Vec<fz_core::CalculatorUri>> {
        self.calculators
            .iter()
            .map(|s| s.parse().map_err(anyhow::Error::from))
            .collect()
    }

    /// The declared variables as `(name, values)` pairs, in declaration
    /// order, for `fz_template::case_gen::enumerate_cartesian`.
    pub fn cartesian_vars(&self) -> Vec<(String, Vec<Value>)> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.values.iter().map(toml_to_value).collect()))
            .collect()
    }

    pub fn table_rows(&self) -> Option<(Vec<String>, Vec<Vec<Value>>)> {
        self.rows.as_ref().map(|t| {
            let rows = t
                .rows
                .iter()
                .map(|row| row.iter().map(toml_to_value).collect())
                .collect();
            (t.columns.clone(), rows)
        })
    }
}

fn toml_to_value(v: &toml::Value) -> Value {
    match v {
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Str(b.to_string()),
        toml::Value::String(s) => Value::cast_from_str(s),
        toml::Value::Datetime(d) => Value::Str(d.to_string()),
        toml::Value::Array(items) => {
            Value::Map(items.iter().enumerate().map(|(i, v)| (i.to_string(), toml_to_value(v))).collect())
        }
        toml::Value::Table(t) => Value::Map(t.iter().map(|(k, v)| (k.clone(), toml_to_value(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_spec() {
        let toml_str = r#"
            template = "template"
            results_dir = "out"

            [model.output]
            result = "cat out.txt"

            [[variables]]
            name = "x"
            values = [1, 2, 3]

            calculators = ["sh://echo hi"]
        "#;
        let spec: RunSpec = toml::from_str(toml_str).unwrap();
        assert_eq!(spec.template, PathBuf::from("template"));
        assert_eq!(spec.variables.len(), 1);
        let model = spec.model().unwrap();
        assert_eq!(model.output, vec![("result".to_string(), "cat out.txt".to_string())]);
        let uris = spec.calculator_uris().unwrap();
        assert_eq!(uris.len(), 1);
    }

    #[test]
    fn defaults_results_dir_when_absent() {
        let toml_str = r#"template = "t""#;
        let spec: RunSpec = toml::from_str(toml_str).unwrap();
        assert_eq!(spec.results_dir, PathBuf::from("results"));
    }

    #[test]
    fn cartesian_vars_preserve_declared_order() {
        let toml_str = r#"
            template = "t"
            [[variables]]
            name = "a"
            values = [1]
            [[variables]]
            name = "b"
            values = [2]
        "#;
        let spec: RunSpec = toml::from_str(toml_str).unwrap();
        let vars = spec.cartesian_vars();
        assert_eq!(vars[0].0, "a");
        assert_eq!(vars[1].0, "b");
    }
}
