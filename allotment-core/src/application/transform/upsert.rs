// allotment-core/src/application/transform/upsert.rs

use chrono::{NaiveDate, NaiveDateTime};

use crate::application::store::{date_param, opt_ts_param, ts_param};
use crate::domain::quality::rule::quote_ident;
use crate::ports::connector::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Int,
    Bool,
    Date,
    Timestamp,
}

impl ColumnKind {
    fn placeholder(&self) -> &'static str {
        match self {
            Self::Date => "CAST(? AS DATE)",
            Self::Timestamp => "CAST(? AS TIMESTAMP)",
            _ => "?",
        }
    }
}

/// Insert-or-update of one target row keyed on its natural key.
///
/// Merge semantics: on conflict a column only takes the incoming value when
/// it is non-null, `updated_at` always advances and `created_at` is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    table: &'static str,
    key: &'static [&'static str],
    columns: Vec<(&'static str, ColumnKind, SqlValue)>,
}

impl Upsert {
    pub fn new(table: &'static str, key: &'static [&'static str]) -> Self {
        Self {
            table,
            key,
            columns: Vec::new(),
        }
    }

    fn push(mut self, column: &'static str, kind: ColumnKind, value: SqlValue) -> Self {
        self.columns.push((column, kind, value));
        self
    }

    pub fn text(self, column: &'static str, value: Option<String>) -> Self {
        self.push(column, ColumnKind::Text, SqlValue::from(value))
    }

    pub fn int(self, column: &'static str, value: Option<i64>) -> Self {
        self.push(column, ColumnKind::Int, SqlValue::from(value))
    }

    pub fn bool(self, column: &'static str, value: Option<bool>) -> Self {
        self.push(column, ColumnKind::Bool, SqlValue::from(value))
    }

    pub fn date(self, column: &'static str, value: Option<NaiveDate>) -> Self {
        self.push(column, ColumnKind::Date, date_param(value))
    }

    pub fn timestamp(self, column: &'static str, value: Option<NaiveDateTime>) -> Self {
        self.push(column, ColumnKind::Timestamp, opt_ts_param(value))
    }

    /// Renders the statement and its parameters.
    pub fn to_sql(&self, now: NaiveDateTime) -> (String, Vec<SqlValue>) {
        let mut names: Vec<String> = self.columns.iter().map(|(c, _, _)| quote_ident(c)).collect();
        let mut placeholders: Vec<&str> = self.columns.iter().map(|(_, k, _)| k.placeholder()).collect();
        let mut params: Vec<SqlValue> = self.columns.iter().map(|(_, _, v)| v.clone()).collect();

        for audit in ["created_at", "updated_at"] {
            names.push(audit.to_string());
            placeholders.push(ColumnKind::Timestamp.placeholder());
            params.push(ts_param(now));
        }

        let mut assignments: Vec<String> = self
            .columns
            .iter()
            .filter(|(c, _, _)| !self.key.contains(c))
            .map(|(c, _, _)| {
                let q = quote_ident(c);
                format!("{q} = COALESCE(EXCLUDED.{q}, {q})")
            })
            .collect();
        assignments.push("updated_at = EXCLUDED.updated_at".to_string());

        let key: Vec<String> = self.key.iter().map(|k| quote_ident(k)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            quote_ident(self.table),
            names.join(", "),
            placeholders.join(", "),
            key.join(", "),
            assignments.join(", ")
        );
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_statement_shape() {
        let upsert = Upsert::new("districts", &["id"])
            .text("id", Some("7".into()))
            .text("name", None)
            .bool("active", Some(true));
        let (sql, params) = upsert.to_sql(NaiveDateTime::default());

        assert!(sql.starts_with(
            "INSERT INTO \"districts\" (\"id\", \"name\", \"active\", created_at, updated_at)"
        ));
        assert!(sql.contains("ON CONFLICT (\"id\") DO UPDATE SET"));
        assert!(sql.contains("\"name\" = COALESCE(EXCLUDED.\"name\", \"name\")"));
        assert!(!sql.contains("\"id\" = COALESCE"));
        assert!(!sql.contains("created_at = "));
        assert!(sql.ends_with("updated_at = EXCLUDED.updated_at"));
        assert_eq!(params.len(), 5);
        assert_eq!(params[1], SqlValue::Null);
    }

    #[test]
    fn test_temporal_columns_are_cast() {
        let upsert = Upsert::new("applications", &["id"])
            .text("id", Some("a".into()))
            .date("birth_date", NaiveDate::from_ymd_opt(1970, 1, 2));
        let (sql, params) = upsert.to_sql(NaiveDateTime::default());
        assert!(sql.contains("VALUES (?, CAST(? AS DATE), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))"));
        assert_eq!(params[1], SqlValue::Text("1970-01-02".into()));
    }
}
