//! Result Assembler: builds the final [`ResultTable`] from a run's
//! [`CaseResult`]s, flattening any dict-valued outputs into separate
//! columns.

use fz_core::{CaseResult, ResultTable, Value};

const MAX_FLATTEN_PASSES: usize = 10;

/// Assemble a [`ResultTable`] from one run's results, flattening
/// dict-valued outputs in place.
pub fn assemble(mut results: Vec<CaseResult>) -> ResultTable {
    flatten_outputs(&mut results);
    ResultTable { rows: results }
}

/// Repeatedly detect dict-valued output columns (sampling the first
/// non-null value per column, matching pandas' dtype-inference approach)
/// and flatten each into `column_key` columns, underscore-joined.
/// Capped at [`MAX_FLATTEN_PASSES`] to guard against pathological input.
fn flatten_outputs(rows: &mut [CaseResult]) {
    for _ in 0..MAX_FLATTEN_PASSES {
        let column_order = collect_column_order(rows);
        let dict_columns: Vec<String> = column_order
            .into_iter()
            .filter(|col| sample_is_map(rows, col))
            .collect();

        if dict_columns.is_empty() {
            break;
        }

        for row in rows.iter_mut() {
            for col in &dict_columns {
                let Some(pos) = row.outputs.iter().position(|(name, _)| name == col) else {
                    continue;
                };
                let (_, value) = row.outputs.remove(pos);
                if let Value::Map(entries) = value {
                    for (flat_key, flat_value) in flatten_dict_recursive(col, &entries) {
                        set_output(&mut row.outputs, flat_key, flat_value);
                    }
                }
            }
        }
    }
}

fn collect_column_order(rows: &[CaseResult]) -> Vec<String> {
    let mut order = Vec::new();
    for row in rows {
        for (name, _) in &row.outputs {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }
    }
    order
}

fn sample_is_map(rows: &[CaseResult], column: &str) -> bool {
    rows.iter()
        .find_map(|row| row.get_output(column).filter(|v| !v.is_null()))
        .is_some_and(Value::is_map)
}

fn set_output(outputs: &mut Vec<(String, Value)>, key: String, value: Value) {
    match outputs.iter_mut().find(|(name, _)| *name == key) {
        Some(existing) => existing.1 = value,
        None => outputs.push((key, value)),
    }
}

/// Recursively flatten one dict-valued output into `parent_key_child...`
/// columns, joined by `_`.
fn flatten_dict_recursive(parent_key: &str, entries: &[(String, Value)]) -> Vec<(String, Value)> {
    let mut items = Vec::new();
    for (key, value) in entries {
        let flat_key = format!("{parent_key}_{key}");
        match value {
            Value::Map(nested) => items.extend(flatten_dict_recursive(&flat_key, nested)),
            other => items.push((flat_key, other.clone())),
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use fz_core::{Case, CaseStatus};
    use std::path::PathBuf;

    fn row(outputs: Vec<(&str, Value)>) -> CaseResult {
        CaseResult {
            case: Case::default(),
            path: PathBuf::from("/tmp/x"),
            status: CaseStatus::Done,
            outputs: outputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calculator: None,
            command: None,
            error: None,
            duration_s: 0.0,
        }
    }

    #[test]
    fn scalar_outputs_pass_through_unchanged() {
        let results = vec![row(vec![("result", Value::Int(1))])];
        let table = assemble(results);
        assert_eq!(table.rows[0].get_output("result"), Some(&Value::Int(1)));
    }

    #[test]
    fn flattens_one_level_of_nesting() {
        let stats = Value::Map(vec![
            ("min".to_string(), Value::Int(1)),
            ("max".to_string(), Value::Int(4)),
        ]);
        let results = vec![row(vec![("stats", stats)])];
        let table = assemble(results);
        assert_eq!(table.rows[0].get_output("stats_min"), Some(&Value::Int(1)));
        assert_eq!(table.rows[0].get_output("stats_max"), Some(&Value::Int(4)));
        assert_eq!(table.rows[0].get_output("stats"), None);
    }

    #[test]
    fn flattens_deeply_nested_dicts_in_one_pass() {
        let basic = Value::Map(vec![
            ("min".to_string(), Value::Int(1)),
            ("max".to_string(), Value::Int(4)),
        ]);
        let stats = Value::Map(vec![("basic".to_string(), basic)]);
        let results = vec![row(vec![("stats", stats)])];
        let table = assemble(results);
        assert_eq!(table.rows[0].get_output("stats_basic_min"), Some(&Value::Int(1)));
        assert_eq!(table.rows[0].get_output("stats_basic_max"), Some(&Value::Int(4)));
    }

    #[test]
    fn rows_missing_a_dict_key_get_no_column_entry() {
        let stats_a = Value::Map(vec![("min".to_string(), Value::Int(1))]);
        let stats_b = Value::Map(vec![("max".to_string(), Value::Int(9))]);
        let results = vec![row(vec![("stats", stats_a)]), row(vec![("stats", stats_b)])];
        let table = assemble(results);
        assert_eq!(table.rows[0].get_output("stats_min"), Some(&Value::Int(1)));
        assert_eq!(table.rows[0].get_output("stats_max"), None);
        assert_eq!(table.rows[1].get_output("stats_max"), Some(&Value::Int(9)));
    }

    #[test]
    fn sampling_skips_null_rows_to_find_the_dict_type() {
        let stats = Value::Map(vec![("min".to_string(), Value::Int(1))]);
        let results = vec![row(vec![("stats", Value::Null)]), row(vec![("stats", stats)])];
        let table = assemble(results);
        assert_eq!(table.rows[1].get_output("stats_min"), Some(&Value::Int(1)));
    }

    #[test]
    fn non_dict_column_untouched_alongside_dict_column() {
        let stats = Value::Map(vec![("min".to_string(), Value::Int(1))]);
        let results = vec![row(vec![
            ("result", Value::Float(2.5)),
            ("stats", stats),
        ])];
        let table = assemble(results);
        assert_eq!(table.rows[0].get_output("result"), Some(&Value::Float(2.5)));
        assert_eq!(table.rows[0].get_output("stats_min"), Some(&Value::Int(1)));
    }

    #[test]
    fn deeply_recursive_dict_output_flattens_fully() {
        let leaf = Value::Map(vec![("c".to_string(), Value::Int(3))]);
        let mid = Value::Map(vec![("b".to_string(), leaf)]);
        let top = Value::Map(vec![("a".to_string(), mid)]);
        let results = vec![row(vec![("nested", top)])];
        let table = assemble(results);
        assert_eq!(table.rows[0].get_output("nested_a_b_c"), Some(&Value::Int(3)));
        assert!(table.rows[0].outputs.iter().all(|(k, _)| k == "nested_a_b_c"));
    }
}
