//! Case enumeration: Cartesian product over per-variable value lists,
//! row-wise iteration over a table, and `group_variables` (variables that
//! vary together as one tuple per step rather than via the product).

use fz_core::{Case, Value};
use std::collections::{HashMap, HashSet};

/// Enumerate the Cartesian product of `vars` (declared order preserved in
/// each emitted Case), collapsing any variable named in `group_variables`
/// into a single lock-step axis instead of multiplying it out.
pub fn enumerate_cartesian(vars: &[(String, Vec<Value>)], group_variables: &[Vec<String>]) -> Vec<Case> {
    let grouped_names: HashSet<&String> = group_variables.iter().flatten().collect();
    let order: Vec<String> = vars.iter().map(|(n, _)| n.clone()).collect();

    let mut axes: Vec<Vec<Vec<(String, Value)>>> = Vec::new();

    for group in group_variables {
        let lists: Vec<&Vec<Value>> = group
            .iter()
            .filter_map(|name| vars.iter().find(|(n, _)| n == name).map(|(_, v)| v))
            .collect();
        let len = lists.iter().map(|l| l.len()).min().unwrap_or(0);
        let mut axis = Vec::with_capacity(len);
        for i in 0..len {
            let tuple: Vec<(String, Value)> = group
                .iter()
                .zip(lists.iter())
                .map(|(name, list)| (name.clone(), list[i].clone()))
                .collect();
            axis.push(tuple);
        }
        axes.push(axis);
    }

    for (name, values) in vars {
        if grouped_names.contains(name) {
            continue;
        }
        let axis: Vec<Vec<(String, Value)>> =
            values.iter().map(|v| vec![(name.clone(), v.clone())]).collect();
        axes.push(axis);
    }

    let mut products: Vec<Vec<(String, Value)>> = vec![Vec::new()];
    for axis in &axes {
        if axis.is_empty() {
            continue;
        }
        let mut next = Vec::with_capacity(products.len() * axis.len());
        for prefix in &products {
            for slot in axis {
                let mut combined = prefix.clone();
                combined.extend(slot.iter().cloned());
                next.push(combined);
            }
        }
        products = next;
    }

    products
        .into_iter()
        .map(|assignments| {
            let mut map: HashMap<String, Value> = assignments.into_iter().collect();
            let ordered: Vec<(String, Value)> = order
                .iter()
                .map(|name| (name.clone(), map.remove(name).unwrap_or(Value::Null)))
                .collect();
            Case::new(ordered)
        })
        .collect()
}

/// Row-wise enumeration over a tabular input: one case per row, in row
/// order, permitting non-factorial designs.
pub fn enumerate_rows(columns: &[String], rows: &[Vec<Value>]) -> Vec<Case> {
    rows.iter()
        .map(|row| {
            let assignments: Vec<(String, Value)> = columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            Case::new(assignments)
        })
        .collect()
}
