// allotment-core/src/application/staging.rs

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::application::registry::BatchRegistry;
use crate::application::store::{now, ts_param};
use crate::domain::entity::{DISTRICT_LINK_COLUMNS, DISTRICT_LINK_STAGING_TABLE, EntityKind};
use crate::domain::migration::{Batch, BatchKind, Operation, RunStatus, UnitCounters};
use crate::domain::quality::rule::{quote_ident, quote_literal};
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, Row, SqlValue};

/// A staged table: one of the entity tables or the district junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedTable {
    Entity(EntityKind),
    DistrictLinks,
}

impl StagedTable {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Entity(e) => e.staging_table(),
            Self::DistrictLinks => DISTRICT_LINK_STAGING_TABLE,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Entity(e) => e.staging_columns(),
            Self::DistrictLinks => DISTRICT_LINK_COLUMNS,
        }
    }

    /// Export file name, e.g. `applications.csv`.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Entity(e) => e.as_str(),
            Self::DistrictLinks => "district_cadastral_links",
        }
    }

    pub fn all() -> impl Iterator<Item = StagedTable> {
        EntityKind::ALL
            .into_iter()
            .map(StagedTable::Entity)
            .chain(std::iter::once(StagedTable::DistrictLinks))
    }
}

/// Append-only store of loosely typed legacy rows.
#[derive(Clone)]
pub struct StagingStore {
    connector: Arc<dyn Connector>,
}

impl StagingStore {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    async fn next_row_num(&self, table: &str, batch_id: i64) -> Result<i64, AllotmentError> {
        Ok(self
            .connector
            .query_scalar(
                &format!(
                    "SELECT coalesce(max(row_num), 0) FROM {} WHERE batch_id = ?",
                    quote_ident(table)
                ),
                &[SqlValue::Int(batch_id)],
            )
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    /// Appends rows aligned with the table's column list. Blank cells stage as NULL.
    pub async fn append(
        &self,
        target: StagedTable,
        batch_id: i64,
        rows: &[Vec<Option<String>>],
    ) -> Result<u64, AllotmentError> {
        let columns = target.columns();
        let mut row_num = self.next_row_num(target.table(), batch_id).await?;
        let ingested_at = now();

        let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (row_num, batch_id, {}, ingested_at) VALUES (?, ?, {}, CAST(? AS TIMESTAMP))",
            quote_ident(target.table()),
            column_list.join(", "),
            placeholders
        );

        for row in rows {
            if row.len() != columns.len() {
                return Err(AllotmentError::InternalError(format!(
                    "{}: expected {} values, got {}",
                    target.table(),
                    columns.len(),
                    row.len()
                )));
            }
            row_num += 1;
            let mut params = Vec::with_capacity(columns.len() + 3);
            params.push(SqlValue::Int(row_num));
            params.push(SqlValue::Int(batch_id));
            params.extend(row.iter().map(|cell| {
                SqlValue::from(
                    cell.as_deref()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string),
                )
            }));
            params.push(ts_param(ingested_at));
            self.connector.execute_with(&sql, &params).await?;
        }
        Ok(rows.len() as u64)
    }

    /// Bulk-loads a CSV export through the store's CSV reader, every column as text.
    /// Columns missing from the file stage as NULL; unknown columns are ignored.
    #[instrument(skip(self, path), fields(table = target.table()))]
    pub async fn ingest_csv(
        &self,
        target: StagedTable,
        batch_id: i64,
        path: &Path,
    ) -> Result<u64, AllotmentError> {
        let source = format!(
            "read_csv({}, all_varchar = true, header = true, parallel = false)",
            quote_literal(&path.to_string_lossy())
        );

        let described = self
            .connector
            .query(&format!("DESCRIBE SELECT * FROM {source}"), &[])
            .await?;
        let file_columns: Vec<String> = described
            .iter()
            .filter_map(|r| r.text("column_name"))
            .collect();

        let projection: Vec<String> = target
            .columns()
            .iter()
            .map(|c| {
                match file_columns.iter().find(|f| f.trim().eq_ignore_ascii_case(c)) {
                    Some(found) => format!("nullif(trim({}), '')", quote_ident(found)),
                    None => "NULL".to_string(),
                }
            })
            .collect();

        let missing: Vec<&str> = target
            .columns()
            .iter()
            .copied()
            .filter(|c| !file_columns.iter().any(|f| f.trim().eq_ignore_ascii_case(c)))
            .collect();
        if !missing.is_empty() {
            warn!(file = ?path, missing = ?missing, "Export lacks columns, staging them as NULL");
        }

        let offset = self.next_row_num(target.table(), batch_id).await?;
        let before = self.count_table(target.table(), batch_id).await?;
        let column_list: Vec<String> = target.columns().iter().map(|c| quote_ident(c)).collect();

        // row_num follows file order only with a sequential scan in insertion order
        self.connector
            .execute("SET preserve_insertion_order = true")
            .await?;
        let sql = format!(
            "INSERT INTO {} (row_num, batch_id, {}, ingested_at) \
             SELECT row_number() OVER () + {offset}, {batch_id}, {}, CAST(? AS TIMESTAMP) FROM {source}",
            quote_ident(target.table()),
            column_list.join(", "),
            projection.join(", "),
        );
        self.connector.execute_with(&sql, &[ts_param(now())]).await?;

        let after = self.count_table(target.table(), batch_id).await?;
        Ok(after.saturating_sub(before))
    }

    async fn count_table(&self, table: &str, batch_id: i64) -> Result<u64, AllotmentError> {
        Ok(self
            .connector
            .query_scalar(
                &format!("SELECT count(*) FROM {} WHERE batch_id = ?", quote_ident(table)),
                &[SqlValue::Int(batch_id)],
            )
            .await?
            .and_then(|v| v.as_i64())
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0))
    }

    pub async fn count(&self, entity: EntityKind, batch_id: i64) -> Result<u64, AllotmentError> {
        self.count_table(entity.staging_table(), batch_id).await
    }

    /// Staged rows of one batch in row-number order.
    pub async fn read_page(
        &self,
        entity: EntityKind,
        batch_id: i64,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Row>, AllotmentError> {
        self.connector
            .query(
                &format!(
                    "SELECT * FROM {} WHERE batch_id = ? ORDER BY row_num LIMIT {limit} OFFSET {offset}",
                    quote_ident(entity.staging_table())
                ),
                &[SqlValue::Int(batch_id)],
            )
            .await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub batch_id: i64,
    pub tables: Vec<(String, u64)>,
    pub failures: Vec<(String, String)>,
}

impl IngestSummary {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Stages every `<entity>.csv` of `dir` into a new MIGRATION batch.
/// Each file gets its own INGEST run-log entry; a broken file does not stop the others.
#[instrument(skip(connector))]
pub async fn ingest_directory(
    connector: Arc<dyn Connector>,
    dir: &Path,
) -> Result<IngestSummary, AllotmentError> {
    let registry = BatchRegistry::new(connector.clone());
    let staging = StagingStore::new(connector);
    let batch: Batch = registry
        .create_batch(BatchKind::Migration, Some(&dir.to_string_lossy()))
        .await?;

    let mut summary = IngestSummary {
        batch_id: batch.id,
        tables: Vec::new(),
        failures: Vec::new(),
    };

    for target in StagedTable::all() {
        let path = dir.join(format!("{}.csv", target.file_stem()));
        if !path.exists() {
            continue;
        }
        let started = Instant::now();
        let entry = registry
            .start_entry(batch.id, target.table(), Operation::Ingest)
            .await?;

        let mut counters = UnitCounters::default();
        let (status, message) = match staging.ingest_csv(target, batch.id, &path).await {
            Ok(n) => {
                counters.processed = n;
                counters.succeeded = n;
                info!(table = target.table(), rows = n, "Staged export");
                summary.tables.push((target.table().to_string(), n));
                (RunStatus::Success, None)
            }
            Err(e) => {
                warn!(table = target.table(), error = %e, "Failed to stage export");
                summary
                    .failures
                    .push((target.table().to_string(), e.to_string()));
                (RunStatus::Error, Some(e.to_string()))
            }
        };

        registry
            .complete_entry(
                entry,
                status,
                &counters,
                message.as_deref(),
                started.elapsed().as_millis() as i64,
            )
            .await?;
    }

    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::DuckDBConnector;
    use crate::infrastructure::schema::bootstrap;
    use anyhow::Result;
    use tempfile::tempdir;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_append_continues_row_numbers() -> Result<()> {
        let db: Arc<dyn Connector> = Arc::new(DuckDBConnector::in_memory()?);
        bootstrap(db.as_ref()).await?;
        let staging = StagingStore::new(db);
        let target = StagedTable::Entity(EntityKind::District);

        staging.append(target, 1, &[cells(&["1", "Nord", "1"])]).await?;
        staging
            .append(target, 1, &[cells(&["2", "Süd", " "]), cells(&["3", "Ost", "0"])])
            .await?;
        staging.append(target, 2, &[cells(&["9", "West", "1"])]).await?;

        assert_eq!(staging.count(EntityKind::District, 1).await?, 3);
        let page = staging.read_page(EntityKind::District, 1, 1, 10).await?;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].int("row_num"), Some(2));
        assert_eq!(page[0].text("name").as_deref(), Some("Süd"));
        assert_eq!(page[0].text("active"), None);

        let wrong_width = staging.append(target, 1, &[cells(&["1"])]).await;
        assert!(wrong_width.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_csv_numbers_rows_in_file_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("districts.csv");
        let mut csv = String::from("district_id,name,active\n");
        for i in 1..=5000 {
            csv.push_str(&format!("{i},Bezirk {i},1\n"));
        }
        std::fs::write(&path, csv)?;

        let db: Arc<dyn Connector> = Arc::new(DuckDBConnector::in_memory()?);
        bootstrap(db.as_ref()).await?;
        let staging = StagingStore::new(db.clone());
        let target = StagedTable::Entity(EntityKind::District);
        staging.append(target, 1, &[cells(&["0", "Vorab", "1"])]).await?;

        assert_eq!(staging.ingest_csv(target, 1, &path).await?, 5000);
        let misplaced = db
            .query_scalar(
                "SELECT count(*) FROM raw_districts \
                 WHERE batch_id = 1 AND CAST(district_id AS BIGINT) + 1 <> row_num",
                &[],
            )
            .await?
            .and_then(|v| v.as_i64());
        assert_eq!(misplaced, Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_directory_reads_csv_as_text() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join("districts.csv"),
            "district_id,name,active,extra\n001,Nord,1,x\n002,Süd,,y\n",
        )?;
        std::fs::write(
            dir.path().join("district_cadastral_links.csv"),
            "district_name,cadastral_code\nNord,K-01\n",
        )?;

        let db: Arc<dyn Connector> = Arc::new(DuckDBConnector::in_memory()?);
        bootstrap(db.as_ref()).await?;
        let summary = ingest_directory(db.clone(), dir.path()).await?;

        assert!(summary.failures.is_empty());
        assert_eq!(summary.total_rows(), 3);

        let staging = StagingStore::new(db.clone());
        let rows = staging.read_page(EntityKind::District, summary.batch_id, 0, 10).await?;
        // Leading zeros survive because nothing is type-sniffed
        assert_eq!(rows[0].text("district_id").as_deref(), Some("001"));
        assert_eq!(rows[1].text("active"), None);

        let entries = BatchRegistry::new(db).entries(summary.batch_id).await?;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == RunStatus::Success));
        Ok(())
    }
}
