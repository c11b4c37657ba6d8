// allotment-core/src/ports/connector.rs

// What the engine needs from a relational store, without knowing which one.
// Queries use `?` positional placeholders; values travel as `SqlValue`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AllotmentError;

/// Simple column description (independent of the DB)
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

/// Store-agnostic scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Float(f) => Some(*f as i64),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Bool(b) => serde_json::Value::Bool(*b),
            SqlValue::Int(i) => serde_json::Value::from(*i),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map(SqlValue::Text).unwrap_or(SqlValue::Null)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        value.map(SqlValue::Int).unwrap_or(SqlValue::Null)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<Option<bool>> for SqlValue {
    fn from(value: Option<bool>) -> Self {
        value.map(SqlValue::Bool).unwrap_or(SqlValue::Null)
    }
}

/// One result row. Column names are shared by every row of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::as_text)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(SqlValue::as_f64)
    }

    pub fn bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(SqlValue::as_bool)
    }

    /// Column name -> JSON value, used for violation samples.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn into_map(self) -> HashMap<String, SqlValue> {
        self.columns.iter().cloned().zip(self.values).collect()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Runs a statement without parameters (DDL, maintenance).
    async fn execute(&self, query: &str) -> Result<(), AllotmentError>;

    /// Runs a parameterized statement, returning the number of affected rows.
    async fn execute_with(&self, query: &str, params: &[SqlValue])
    -> Result<usize, AllotmentError>;

    async fn query(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>, AllotmentError>;

    /// First column of the first row, `None` when the result set is empty.
    async fn query_scalar(
        &self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqlValue>, AllotmentError> {
        let rows = self.query(query, params).await?;
        Ok(rows.into_iter().next().and_then(|r| r.values.into_iter().next()))
    }

    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AllotmentError>;

    fn engine_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new(
            Arc::new(vec!["ID".into(), "name".into()]),
            vec![SqlValue::Int(7), SqlValue::Text("Nord".into())],
        );
        assert_eq!(row.int("id"), Some(7));
        assert_eq!(row.text("NAME").as_deref(), Some("Nord"));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_row_to_json() {
        let row = Row::new(
            Arc::new(vec!["id".into(), "email".into()]),
            vec![SqlValue::Text("a1".into()), SqlValue::Null],
        );
        assert_eq!(
            row.to_json(),
            serde_json::json!({ "id": "a1", "email": null })
        );
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(SqlValue::Text(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(SqlValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(SqlValue::Null.as_text(), None);
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
    }
}
