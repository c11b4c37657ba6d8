// allotment-core/src/infrastructure/adapters/duckdb.rs

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use duckdb::types::{TimeUnit, Value};
use duckdb::{Config, Connection, params_from_iter};

use crate::error::AllotmentError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::connector::{ColumnSchema, Connector, Row, SqlValue};

pub struct DuckDBConnector {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDBConnector {
    pub fn new(db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            if let Some(parent) = std::path::Path::new(db_path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(db_path, config)?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, InfrastructureError> {
        Self::new(":memory:")
    }

    /// Runs `f` against the locked connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, AllotmentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AllotmentError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AllotmentError::from(InfrastructureError::Database(DatabaseError::Poisoned)))?;
            f(&guard)
        })
        .await
        .map_err(|e| AllotmentError::InternalError(format!("DuckDB task failed: {e}")))?
    }
}

fn to_duck(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Boolean(*b),
        SqlValue::Int(i) => Value::BigInt(*i),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

fn from_duck(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Bool(b),
        Value::TinyInt(i) => SqlValue::Int(i64::from(i)),
        Value::SmallInt(i) => SqlValue::Int(i64::from(i)),
        Value::Int(i) => SqlValue::Int(i64::from(i)),
        Value::BigInt(i) => SqlValue::Int(i),
        Value::HugeInt(i) => i64::try_from(i)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Float(i as f64)),
        Value::UTinyInt(i) => SqlValue::Int(i64::from(i)),
        Value::USmallInt(i) => SqlValue::Int(i64::from(i)),
        Value::UInt(i) => SqlValue::Int(i64::from(i)),
        Value::UBigInt(i) => i64::try_from(i)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Float(i as f64)),
        Value::Float(f) => SqlValue::Float(f64::from(f)),
        Value::Double(f) => SqlValue::Float(f),
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        Value::Text(s) => SqlValue::Text(s),
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(days))))
            .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(SqlValue::Null),
        Value::Timestamp(unit, raw) => DateTime::<Utc>::from_timestamp_micros(micros(unit, raw))
            .map(|ts| SqlValue::Text(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(SqlValue::Null),
        other => SqlValue::Text(format!("{:?}", other)),
    }
}

#[async_trait]
impl Connector for DuckDBConnector {
    async fn execute(&self, query: &str) -> Result<(), AllotmentError> {
        let query = query.to_string();
        self.blocking(move |conn| {
            conn.execute_batch(&query)?;
            Ok(())
        })
        .await
    }

    async fn execute_with(
        &self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<usize, AllotmentError> {
        let query = query.to_string();
        let values: Vec<Value> = params.iter().map(to_duck).collect();
        self.blocking(move |conn| Ok(conn.execute(&query, params_from_iter(values.iter()))?))
            .await
    }

    async fn query(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Row>, AllotmentError> {
        let query = query.to_string();
        let values: Vec<Value> = params.iter().map(to_duck).collect();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params_from_iter(values.iter()))?;

            // Column metadata is only available once the statement ran
            let columns: Arc<Vec<String>> = Arc::new(
                rows.as_ref()
                    .map(|s| s.column_names())
                    .unwrap_or_default(),
            );

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut cells = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    let value: Value = row.get(idx)?;
                    cells.push(from_duck(value));
                }
                out.push(Row::new(columns.clone(), cells));
            }
            Ok(out)
        })
        .await
    }

    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<ColumnSchema>, AllotmentError> {
        let pragma = format!("PRAGMA table_info('{}')", table_name.replace('\'', "''"));
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&pragma)?;
            let rows = stmt.query_map([], |row| {
                Ok(ColumnSchema {
                    name: row.get("name")?,
                    data_type: row.get("type")?,
                    is_nullable: !row.get::<_, bool>("notnull")?,
                })
            })?;

            let mut columns = Vec::new();
            for row in rows {
                columns.push(row?);
            }
            Ok(columns)
        })
        .await
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }
}
