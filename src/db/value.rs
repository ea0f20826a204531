//! Conversion of SQLite values into JSON for result sets and sample rows

use rusqlite::types::ValueRef;
use rusqlite::Row;
use std::collections::BTreeMap;

pub fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            serde_json::Value::String(hex)
        }
    }
}

/// Map a row to column name → value using the statement's column order
pub fn row_to_map(
    row: &Row<'_>,
    columns: &[String],
) -> rusqlite::Result<BTreeMap<String, serde_json::Value>> {
    let mut map = BTreeMap::new();
    for (idx, name) in columns.iter().enumerate() {
        map.insert(name.clone(), value_to_json(row.get_ref(idx)?));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(value_to_json(ValueRef::Null), serde_json::Value::Null);
        assert_eq!(value_to_json(ValueRef::Integer(7)), serde_json::json!(7));
        assert_eq!(value_to_json(ValueRef::Real(2.5)), serde_json::json!(2.5));
        assert_eq!(value_to_json(ValueRef::Text(b"abc")), serde_json::json!("abc"));
        assert_eq!(value_to_json(ValueRef::Blob(&[0xde, 0xad])), serde_json::json!("dead"));
    }
}
