//! Structured Result - Uniform tabular shape returned by every data-producing capability

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Real(f) => Some(*f),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
            Scalar::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Convert a JSON argument into a bindable value. Nested values are not bindable.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Bool(b) => Some(Scalar::Integer(i64::from(*b))),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Scalar::Integer)
                .or_else(|| n.as_f64().map(Scalar::Real)),
            serde_json::Value::String(s) => Some(Scalar::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl From<ValueRef<'_>> for Scalar {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Scalar::Null,
            ValueRef::Integer(i) => Scalar::Integer(i),
            ValueRef::Real(f) => Scalar::Real(f),
            ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Scalar::Text(format!("<blob {} bytes>", bytes.len())),
        }
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Owned(Value::Null),
            Scalar::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Scalar::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Real(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Standardized result from the execution and analytics engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Column names, in projection order
    pub columns: Vec<String>,

    /// Rows aligned to `columns`
    pub rows: Vec<Vec<Scalar>>,

    /// Number of rows returned (after truncation)
    pub row_count: usize,

    /// Execution time in milliseconds
    pub elapsed_ms: u64,

    /// Set when the row cap cut the result short
    #[serde(default)]
    pub truncated: bool,
}

impl StructuredResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>, elapsed_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            elapsed_ms,
            truncated: false,
        }
    }

    /// A one-cell result, used by the reporting capability.
    pub fn single(column: &str, value: Scalar) -> Self {
        Self::new(vec![column.to_string()], vec![vec![value]], 0)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Iterate one column's values.
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Scalar> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Append a computed column. `values` must have one entry per row.
    pub fn push_column(&mut self, name: &str, values: Vec<Scalar>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Rows as JSON objects keyed by column, capped at `limit` rows.
    pub fn to_json_records(&self, limit: usize) -> serde_json::Value {
        let records: Vec<serde_json::Value> = self
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                let mut record = serde_json::Map::new();
                for (col, value) in self.columns.iter().zip(row) {
                    let v = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                    record.insert(col.clone(), v);
                }
                serde_json::Value::Object(record)
            })
            .collect();
        serde_json::json!({
            "columns": self.columns,
            "rows": records,
            "row_count": self.row_count,
            "truncated": self.truncated || self.rows.len() > limit,
        })
    }
}

/// Give aggregate projections stable names: `COUNT(*)` becomes `count`,
/// `SUM(od.Quantity)` becomes `sum`. Duplicates receive `_2`, `_3`, ...
pub fn normalize_column_names(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .map(|name| {
            let base = aggregate_function_name(name).unwrap_or_else(|| name.clone());
            let count = seen.entry(base.to_ascii_lowercase()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{}_{}", base, count)
            }
        })
        .collect()
}

fn aggregate_function_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    let open = trimmed.find('(')?;
    if !trimmed.ends_with(')') || open == 0 {
        return None;
    }
    let func = &trimmed[..open];
    if func.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(func.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aggregate_names() {
        let raw = vec![
            "COUNT(*)".to_string(),
            "CategoryName".to_string(),
            "SUM(Quantity)".to_string(),
            "sum(UnitPrice)".to_string(),
        ];
        assert_eq!(
            normalize_column_names(&raw),
            vec!["count", "CategoryName", "sum", "sum_2"]
        );
    }

    #[test]
    fn test_expressions_keep_their_name() {
        let raw = vec!["a + b".to_string(), "(x)".to_string()];
        assert_eq!(normalize_column_names(&raw), vec!["a + b", "(x)"]);
    }

    #[test]
    fn test_scalar_from_json() {
        assert_eq!(Scalar::from_json(&serde_json::json!(5)), Some(Scalar::Integer(5)));
        assert_eq!(Scalar::from_json(&serde_json::json!(true)), Some(Scalar::Integer(1)));
        assert_eq!(Scalar::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_json_records_flag_preview_truncation() {
        let result = StructuredResult::new(
            vec!["n".to_string()],
            (0..5).map(|i| vec![Scalar::Integer(i)]).collect(),
            1,
        );
        let json = result.to_json_records(2);
        assert_eq!(json["rows"].as_array().map(|a| a.len()), Some(2));
        assert_eq!(json["truncated"], serde_json::json!(true));
    }
}
