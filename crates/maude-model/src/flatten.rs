use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Separator between the parts of a flattened column name.
pub const KEY_SEPARATOR: char = '_';

/// A flattened record: column name -> cell text.
pub type FlatRow = BTreeMap<String, String>;

/// Flatten a JSON object into a single-level row.
///
/// - Nested objects join their keys with `_` (`device_0_brand_name`).
/// - Array elements get an index suffix; object elements are flattened
///   further, anything else becomes one cell.
/// - Empty objects and arrays produce no columns.
/// - If two paths collapse onto the same column, the later one wins.
///
/// A non-object value has no column names and yields an empty row.
pub fn flatten_record(value: &Value) -> FlatRow {
    let mut row = FlatRow::new();
    if let Value::Object(map) = value {
        flatten_object(map, None, &mut row);
    }
    row
}

fn flatten_object(map: &Map<String, Value>, parent: Option<&str>, row: &mut FlatRow) {
    for (key, value) in map {
        let column = join_key(parent, key);
        match value {
            Value::Object(inner) => flatten_object(inner, Some(&column), row),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let indexed = join_key(Some(&column), &i.to_string());
                    match item {
                        Value::Object(inner) => flatten_object(inner, Some(&indexed), row),
                        other => {
                            row.insert(indexed, render_cell(other));
                        }
                    }
                }
            }
            scalar => {
                row.insert(column, render_cell(scalar));
            }
        }
    }
}

fn join_key(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(p) => format!("{p}{KEY_SEPARATOR}{key}"),
        None => key.to_string(),
    }
}

/// Render a leaf value as CSV cell text.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Arrays nested directly in arrays, kept whole as JSON text
        other => other.to_string(),
    }
}

/// Sorted union of every column name across the rows.
pub fn column_union<'a>(rows: impl IntoIterator<Item = &'a FlatRow>) -> Vec<String> {
    let columns: BTreeSet<&String> = rows.into_iter().flat_map(|r| r.keys()).collect();
    columns.into_iter().cloned().collect()
}
