// allotment-core/src/application/registry.rs

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::store::{now, parse_ts, ts_param, u64_of};
use crate::domain::error::DomainError;
use crate::domain::migration::{
    Batch, BatchKind, Operation, RunLogEntry, RunStatus, UnitCounters, sanitize_message,
};
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, Row, SqlValue};

const ENTRY_COLUMNS: &str = "id, batch_id, entity, operation, status, message, processed, succeeded, failed, warnings, started_at, completed_at, duration_ms";

/// Batch registry and run log.
#[derive(Clone)]
pub struct BatchRegistry {
    connector: Arc<dyn Connector>,
}

fn batch_from_row(row: &Row) -> Result<Batch, AllotmentError> {
    let kind = row.text("kind").unwrap_or_default().parse::<BatchKind>()?;
    Ok(Batch {
        id: row.int("id").unwrap_or_default(),
        kind,
        source: row.text("source"),
        created_at: row
            .text("created_at")
            .as_deref()
            .and_then(parse_ts)
            .unwrap_or_default(),
    })
}

fn entry_from_row(row: &Row) -> Result<RunLogEntry, AllotmentError> {
    Ok(RunLogEntry {
        id: row.int("id").unwrap_or_default(),
        batch_id: row.int("batch_id").unwrap_or_default(),
        entity: row.text("entity").unwrap_or_default(),
        operation: row.text("operation").unwrap_or_default(),
        status: row.text("status").unwrap_or_default().parse::<RunStatus>()?,
        message: row.text("message"),
        processed: u64_of(row.int("processed")),
        succeeded: u64_of(row.int("succeeded")),
        failed: u64_of(row.int("failed")),
        warnings: u64_of(row.int("warnings")),
        started_at: row
            .text("started_at")
            .as_deref()
            .and_then(parse_ts)
            .unwrap_or_default(),
        completed_at: row.text("completed_at").as_deref().and_then(parse_ts),
        duration_ms: row.int("duration_ms"),
    })
}

impl BatchRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    #[instrument(skip(self))]
    pub async fn create_batch(
        &self,
        kind: BatchKind,
        source: Option<&str>,
    ) -> Result<Batch, AllotmentError> {
        let id = self
            .connector
            .query_scalar("SELECT nextval('seq_batches')", &[])
            .await?
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AllotmentError::InternalError("batch sequence returned nothing".into()))?;
        let created_at = now();

        self.connector
            .execute_with(
                "INSERT INTO batches (id, kind, source, created_at) VALUES (?, ?, ?, CAST(? AS TIMESTAMP))",
                &[
                    SqlValue::Int(id),
                    SqlValue::from(kind.as_str()),
                    SqlValue::from(source.map(str::to_string)),
                    ts_param(created_at),
                ],
            )
            .await?;

        debug!(batch_id = id, kind = kind.as_str(), "Batch created");
        Ok(Batch {
            id,
            kind,
            source: source.map(str::to_string),
            created_at,
        })
    }

    pub async fn get_batch(&self, id: i64) -> Result<Batch, AllotmentError> {
        let rows = self
            .connector
            .query(
                "SELECT id, kind, source, created_at FROM batches WHERE id = ?",
                &[SqlValue::Int(id)],
            )
            .await?;
        match rows.first() {
            Some(row) => batch_from_row(row),
            None => Err(DomainError::BatchNotFound(id).into()),
        }
    }

    pub async fn latest_batch(&self, kind: Option<BatchKind>) -> Result<Option<Batch>, AllotmentError> {
        let rows = match kind {
            Some(k) => {
                self.connector
                    .query(
                        "SELECT id, kind, source, created_at FROM batches WHERE kind = ? ORDER BY id DESC LIMIT 1",
                        &[SqlValue::from(k.as_str())],
                    )
                    .await?
            }
            None => {
                self.connector
                    .query(
                        "SELECT id, kind, source, created_at FROM batches ORDER BY id DESC LIMIT 1",
                        &[],
                    )
                    .await?
            }
        };
        rows.first().map(batch_from_row).transpose()
    }

    pub async fn list_batches(&self, limit: usize) -> Result<Vec<Batch>, AllotmentError> {
        let rows = self
            .connector
            .query(
                &format!("SELECT id, kind, source, created_at FROM batches ORDER BY id DESC LIMIT {limit}"),
                &[],
            )
            .await?;
        rows.iter().map(batch_from_row).collect()
    }

    /// Opens (or reopens) the single run-log row of the triple in STARTED state.
    pub async fn start_entry(
        &self,
        batch_id: i64,
        entity: &str,
        operation: Operation,
    ) -> Result<i64, AllotmentError> {
        self.connector
            .execute_with(
                "INSERT INTO run_log (batch_id, entity, operation, status, started_at) \
                 VALUES (?, ?, ?, 'STARTED', CAST(? AS TIMESTAMP)) \
                 ON CONFLICT (batch_id, entity, operation) DO UPDATE SET \
                 status = 'STARTED', message = NULL, processed = 0, succeeded = 0, failed = 0, \
                 warnings = 0, started_at = EXCLUDED.started_at, completed_at = NULL, duration_ms = NULL",
                &[
                    SqlValue::Int(batch_id),
                    SqlValue::from(entity),
                    SqlValue::from(operation.as_str()),
                    ts_param(now()),
                ],
            )
            .await?;

        self.connector
            .query_scalar(
                "SELECT id FROM run_log WHERE batch_id = ? AND entity = ? AND operation = ?",
                &[
                    SqlValue::Int(batch_id),
                    SqlValue::from(entity),
                    SqlValue::from(operation.as_str()),
                ],
            )
            .await?
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AllotmentError::InternalError(format!("run log entry for {} vanished", entity)))
    }

    /// Writes the final counters of a step. Called once per step.
    pub async fn complete_entry(
        &self,
        entry_id: i64,
        status: RunStatus,
        counters: &UnitCounters,
        message: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), AllotmentError> {
        self.connector
            .execute_with(
                "UPDATE run_log SET status = ?, message = ?, processed = ?, succeeded = ?, failed = ?, \
                 warnings = ?, completed_at = CAST(? AS TIMESTAMP), duration_ms = ? WHERE id = ?",
                &[
                    SqlValue::from(status.as_str()),
                    SqlValue::from(message.map(sanitize_message)),
                    SqlValue::Int(counters.processed as i64),
                    SqlValue::Int(counters.succeeded as i64),
                    SqlValue::Int(counters.failed as i64),
                    SqlValue::Int(counters.field_issues as i64),
                    ts_param(now()),
                    SqlValue::Int(duration_ms),
                    SqlValue::Int(entry_id),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn entries(&self, batch_id: i64) -> Result<Vec<RunLogEntry>, AllotmentError> {
        let rows = self
            .connector
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM run_log WHERE batch_id = ? ORDER BY id"),
                &[SqlValue::Int(batch_id)],
            )
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn entry(
        &self,
        batch_id: i64,
        entity: &str,
        operation: Operation,
    ) -> Result<Option<RunLogEntry>, AllotmentError> {
        let rows = self
            .connector
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM run_log WHERE batch_id = ? AND entity = ? AND operation = ?"
                ),
                &[
                    SqlValue::Int(batch_id),
                    SqlValue::from(entity),
                    SqlValue::from(operation.as_str()),
                ],
            )
            .await?;
        rows.first().map(entry_from_row).transpose()
    }
}
