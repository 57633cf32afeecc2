//! Row-like mappings returned by the data-store boundary.
//!
//! The store yields plain JSON objects rather than typed structs so the cache
//! and job layers stay decoupled from the relational schema.

use serde_json::{Map, Value};

/// A single row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Convert a JSON value into a [`Row`], yielding an empty row for non-objects.
pub fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Read an integer column, tolerating numeric strings the way loosely-typed
/// relational rows sometimes deliver them.
pub fn get_i64(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read a string column.
pub fn get_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_i64_tolerates_numeric_strings() {
        let row = object(json!({"score": "42", "total": 50, "name": "x"}));
        assert_eq!(get_i64(&row, "score"), Some(42));
        assert_eq!(get_i64(&row, "total"), Some(50));
        assert_eq!(get_i64(&row, "name"), None);
        assert_eq!(get_i64(&row, "missing"), None);
    }

    #[test]
    fn object_on_non_object_is_empty() {
        assert!(object(json!([1, 2])).is_empty());
    }
}
