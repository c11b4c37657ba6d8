// allotment-core/src/application/orchestrator.rs

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::application::registry::BatchRegistry;
use crate::application::staging::StagingStore;
use crate::application::store::now;
use crate::application::transform::{TransformUnit, UnitContext, run_pages, unit_for};
use crate::application::validation::MigrationValidation;
use crate::domain::entity::EntityKind;
use crate::domain::graph::GraphSolver;
use crate::domain::migration::{
    EntityProgress, Operation, RunLogEntry, RunStatus, UnitCounters, UnitOutcome,
};
use crate::domain::project::MigrationSettings;
use crate::error::AllotmentError;
use crate::ports::connector::Connector;

/// Result of `run_migration`: one outcome per executed unit plus the
/// persisted run-log view.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub batch_id: i64,
    pub status: RunStatus,
    pub outcomes: Vec<UnitOutcome>,
    pub entries: Vec<RunLogEntry>,
    pub summary: Vec<EntityProgress>,
    /// Units never started because the run was cancelled.
    pub skipped: Vec<EntityKind>,
    /// Target-table counts and integrity checks taken after the last tier.
    pub validation: MigrationValidation,
    pub duration_ms: i64,
}

impl MigrationRun {
    pub fn outcome(&self, entity: EntityKind) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| o.entity == entity)
    }

    pub fn progress(&self, entity: EntityKind) -> Option<&EntityProgress> {
        self.summary.iter().find(|p| p.entity == entity)
    }
}

/// Runs the transformation units of a batch tier by tier.
pub struct MigrationOrchestrator {
    connector: Arc<dyn Connector>,
    registry: BatchRegistry,
    staging: StagingStore,
    settings: MigrationSettings,
    cancel: CancellationToken,
}

impl MigrationOrchestrator {
    pub fn new(connector: Arc<dyn Connector>, settings: MigrationSettings) -> Self {
        Self {
            registry: BatchRegistry::new(connector.clone()),
            staging: StagingStore::new(connector.clone()),
            connector,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Once cancelled, no new unit or page starts; in-flight pages finish.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Migrates the batch's staged rows, all entities or `selection`.
    ///
    /// Unit failures are captured into the outcomes; only registry faults
    /// and an unknown batch surface as `Err`.
    #[instrument(skip(self, selection))]
    pub async fn run_migration(
        &self,
        batch_id: i64,
        selection: Option<&[EntityKind]>,
    ) -> Result<MigrationRun, AllotmentError> {
        let start = Instant::now();
        self.registry.get_batch(batch_id).await?;

        let selected: Vec<EntityKind> = selection.map_or_else(|| EntityKind::ALL.to_vec(), <[_]>::to_vec);
        let tiers = GraphSolver::plan_execution(&selected)?;
        info!(batch_id, tiers = tiers.len(), units = selected.len(), "Migration planned");

        let mut outcomes = Vec::with_capacity(selected.len());
        let mut skipped = Vec::new();

        for (i, tier) in tiers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                skipped.extend(tier.iter().copied());
                continue;
            }
            info!(batch_id, tier = i + 1, "Running tier {:?}", tier);

            let runs = tier.iter().map(|entity| {
                let unit = unit_for(*entity);
                async move { self.execute_unit(batch_id, unit.as_ref()).await }
            });
            let results: Vec<_> = futures::stream::iter(runs)
                .buffer_unordered(self.settings.max_concurrency.max(1))
                .collect()
                .await;

            for result in results {
                outcomes.push(result?);
            }
        }

        outcomes.sort_by_key(|o| o.entity);
        let status = RunStatus::worst(outcomes.iter().map(|o| o.status));
        let entries = self
            .registry
            .entries(batch_id)
            .await?
            .into_iter()
            .filter(|e| e.operation == Operation::Transform.as_str())
            .collect();
        let summary = self.summary_for(batch_id, &selected).await?;
        let validation = MigrationValidation::collect(&self.connector).await;
        let duration_ms = start.elapsed().as_millis() as i64;

        info!(batch_id, status = status.as_str(), duration_ms, "Migration finished");
        Ok(MigrationRun {
            batch_id,
            status,
            outcomes,
            entries,
            summary,
            skipped,
            validation,
            duration_ms,
        })
    }

    /// Progress of every entity of a batch, from staged counts and the run log.
    pub async fn summary(&self, batch_id: i64) -> Result<Vec<EntityProgress>, AllotmentError> {
        self.summary_for(batch_id, &EntityKind::ALL).await
    }

    async fn summary_for(
        &self,
        batch_id: i64,
        entities: &[EntityKind],
    ) -> Result<Vec<EntityProgress>, AllotmentError> {
        let mut progress = Vec::with_capacity(entities.len());
        for entity in entities {
            let staged = self.staging.count(*entity, batch_id).await?;
            let entry = self
                .registry
                .entry(batch_id, entity.as_str(), Operation::Transform)
                .await?;
            progress.push(EntityProgress::compute(*entity, staged, entry.as_ref()));
        }
        progress.sort_by_key(|p| p.entity);
        Ok(progress)
    }

    /// Runs one unit, retrying once at the reduced page size, and closes
    /// its run-log entry.
    async fn execute_unit(
        &self,
        batch_id: i64,
        unit: &dyn TransformUnit,
    ) -> Result<UnitOutcome, AllotmentError> {
        let entity = unit.entity();
        let start = Instant::now();
        let entry_id = self
            .registry
            .start_entry(batch_id, entity.as_str(), Operation::Transform)
            .await?;

        let ctx = UnitContext {
            connector: self.connector.clone(),
            batch_id,
            now: now(),
        };
        let page_size = self.settings.page_size_for(entity);

        let mut page_sizes = vec![page_size];
        let mut first_failure = None;
        let mut attempt = run_pages(unit, &ctx, &self.staging, page_size, &self.cancel).await;
        if let Err(e) = &attempt {
            let retry_size = self.settings.retry_page_size(page_size);
            warn!(entity = %entity, page_size, retry_size, "Unit failed, retrying once: {}", e);
            first_failure = Some(e.to_string());
            page_sizes.push(retry_size);
            attempt = run_pages(unit, &ctx, &self.staging, retry_size, &self.cancel).await;
        }
        let retried = first_failure.is_some();

        let (counters, cancelled, message, unit_failed) = match (attempt, first_failure) {
            // The failed first attempt stands when its retry was cut short
            (Ok(run), Some(first)) if run.cancelled => (
                run.counters,
                true,
                Some(format!("unit failed and its retry was cancelled: {}", first)),
                true,
            ),
            (Ok(run), _) => (run.counters, run.cancelled, run.summary(), false),
            (Err(e), _) => (
                UnitCounters::default(),
                false,
                Some(format!("unit failed after retry: {}", e)),
                true,
            ),
        };
        let status = counters.status(unit_failed, cancelled, self.settings.error_tolerance);
        let duration_ms = start.elapsed().as_millis() as i64;

        self.registry
            .complete_entry(entry_id, status, &counters, message.as_deref(), duration_ms)
            .await?;

        let outcome = UnitOutcome {
            entity,
            status,
            counters,
            message,
            duration_ms,
            retried,
            cancelled,
            page_sizes,
        };
        info!(
            entity = %entity,
            status = status.as_str(),
            processed = counters.processed,
            succeeded = counters.succeeded,
            failed = counters.failed,
            throughput_per_min = outcome.throughput_per_minute(),
            "Unit finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::registry::BatchRegistry;
    use crate::application::staging::StagedTable;
    use crate::application::transform::testing::{entity, stage, store};
    use crate::application::transform::{RowResult, Upsert};
    use crate::domain::conversion::Converter;
    use crate::domain::error::DomainError;
    use crate::domain::migration::BatchKind;
    use crate::ports::connector::{Row, SqlValue};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn seeded_batch(db: &Arc<dyn Connector>) -> Result<i64> {
        let batch = BatchRegistry::new(db.clone())
            .create_batch(BatchKind::Migration, None)
            .await?;
        let b = batch.id;
        stage(db, entity(EntityKind::District), b, &[&["1", "Nord", "1"]]).await?;
        stage(db, entity(EntityKind::CadastralDistrict), b, &[&["c1", "1", "K1", "Am See"]]).await?;
        stage(db, entity(EntityKind::FileReference), b, &[&["f1", "KGV", "1", "2020"]]).await?;

        let mut app = vec![""; EntityKind::Application.staging_columns().len()];
        app[0] = "a1";
        app[1] = "KGV-1/2020";
        app[7] = "Lehmann";
        stage(db, entity(EntityKind::Application), b, &[&app]).await?;

        stage(
            db,
            entity(EntityKind::ApplicationHistory),
            b,
            &[
                &["h1", "a1", "", "Eingang", "", "", "", "", "", "", "", ""],
                &["h2", "zz", "", "Eingang", "", "", "", "", "", "", "", ""],
            ],
        )
        .await?;
        Ok(b)
    }

    async fn table_count(db: &Arc<dyn Connector>, table: &str) -> Result<i64> {
        let count = db
            .query_scalar(&format!("SELECT count(*) FROM {}", table), &[])
            .await?
            .and_then(|v| v.as_i64())
            .unwrap();
        Ok(count)
    }

    #[tokio::test]
    async fn test_full_migration_is_idempotent() -> Result<()> {
        let db = store().await?;
        let batch = seeded_batch(&db).await?;
        let orchestrator = MigrationOrchestrator::new(db.clone(), MigrationSettings::default());

        let first = orchestrator.run_migration(batch, None).await?;
        assert_eq!(first.outcomes.len(), EntityKind::ALL.len());
        assert_eq!(first.entries.len(), EntityKind::ALL.len());
        assert_eq!(first.outcome(EntityKind::CadastralDistrict).unwrap().counters.failed, 0);

        // Orphan history entry is rejected and shows up in the summary
        let history = first.progress(EntityKind::ApplicationHistory).unwrap();
        assert_eq!((history.staged, history.succeeded, history.failed), (2, 1, 1));
        assert_eq!(history.quality_score, Some(0.5));
        assert_eq!(first.outcome(EntityKind::ApplicationHistory).unwrap().status, RunStatus::Error);
        assert_eq!(first.status, RunStatus::Error);

        let validation = &first.validation;
        assert!(validation.error.is_none());
        assert_eq!(validation.record_counts["districts"], 1);
        assert_eq!(validation.record_counts["cadastral_districts"], 1);
        assert_eq!(validation.record_counts["file_references"], 1);
        assert_eq!(validation.record_counts["applications"], 1);
        assert_eq!(validation.record_counts["application_history"], 1);
        assert_eq!(validation.record_counts["users"], 0);
        assert_eq!(validation.integrity_violations(), 0);

        let before: Vec<i64> = futures::future::try_join_all(
            EntityKind::ALL.iter().map(|e| table_count(&db, e.target_table())),
        )
        .await?;
        let second = orchestrator.run_migration(batch, None).await?;
        let after: Vec<i64> = futures::future::try_join_all(
            EntityKind::ALL.iter().map(|e| table_count(&db, e.target_table())),
        )
        .await?;
        assert_eq!(before, after);
        assert_eq!(second.entries.len(), EntityKind::ALL.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_selection_and_unknown_batch() -> Result<()> {
        let db = store().await?;
        let batch = seeded_batch(&db).await?;
        let orchestrator = MigrationOrchestrator::new(db.clone(), MigrationSettings::default());

        let run = orchestrator
            .run_migration(batch, Some(&[EntityKind::District, EntityKind::CadastralDistrict]))
            .await?;
        assert_eq!(run.outcomes.len(), 2);
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(table_count(&db, "applications").await?, 0);

        let missing = orchestrator.run_migration(batch + 100, None).await;
        assert!(matches!(
            missing,
            Err(AllotmentError::Domain(DomainError::BatchNotFound(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() -> Result<()> {
        let db = store().await?;
        let batch = seeded_batch(&db).await?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = MigrationOrchestrator::new(db.clone(), MigrationSettings::default())
            .with_cancellation(cancel);

        let run = orchestrator.run_migration(batch, None).await?;
        assert!(run.outcomes.is_empty());
        assert_eq!(run.skipped.len(), EntityKind::ALL.len());
        assert_eq!(table_count(&db, "districts").await?, 0);
        Ok(())
    }

    struct FaultyUnit {
        attempts: AtomicUsize,
        /// Fired while the first attempt fails.
        cancel_on_failure: Option<CancellationToken>,
    }

    impl FaultyUnit {
        fn new() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                cancel_on_failure: None,
            }
        }
    }

    #[async_trait]
    impl TransformUnit for FaultyUnit {
        fn entity(&self) -> EntityKind {
            EntityKind::District
        }

        async fn transform(
            &self,
            row: &Row,
            _conv: &mut Converter,
            _ctx: &UnitContext,
        ) -> Result<RowResult, AllotmentError> {
            // First attempt faults, the retry loads normally
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(cancel) = &self.cancel_on_failure {
                    cancel.cancel();
                }
                return Err(AllotmentError::InternalError("target unreachable".into()));
            }
            Ok(Ok(Upsert::new("districts", &["id"])
                .text("id", row.text("district_id"))
                .text("name", row.text("name"))))
        }
    }

    struct DeadUnit;

    #[async_trait]
    impl TransformUnit for DeadUnit {
        fn entity(&self) -> EntityKind {
            EntityKind::District
        }

        async fn transform(
            &self,
            _row: &Row,
            _conv: &mut Converter,
            _ctx: &UnitContext,
        ) -> Result<RowResult, AllotmentError> {
            Err(AllotmentError::InternalError("target unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_unit_retry_then_error() -> Result<()> {
        let db = store().await?;
        let batch = seeded_batch(&db).await?;
        stage(&db, StagedTable::Entity(EntityKind::District), batch, &[&["2", "Süd", "1"]]).await?;
        let orchestrator = MigrationOrchestrator::new(db.clone(), MigrationSettings::default());

        let recovered = orchestrator
            .execute_unit(batch, &FaultyUnit::new())
            .await?;
        assert!(recovered.retried);
        assert_eq!(recovered.status, RunStatus::Success);
        assert_eq!(recovered.counters.succeeded, 2);

        let failed = orchestrator.execute_unit(batch, &DeadUnit).await?;
        assert!(failed.retried);
        assert_eq!(failed.status, RunStatus::Error);
        let entry = BatchRegistry::new(db.clone())
            .entry(batch, "districts", Operation::Transform)
            .await?
            .unwrap();
        assert_eq!(entry.status, RunStatus::Error);
        assert!(entry.message.unwrap().contains("target unreachable"));
        assert_eq!(
            db.query_scalar("SELECT name FROM districts WHERE id = '2'", &[]).await?,
            Some(SqlValue::Text("Süd".into()))
        );
        Ok(())
    }

    fn small_pages() -> MigrationSettings {
        MigrationSettings {
            page_sizes: BTreeMap::from([(EntityKind::District.as_str().to_string(), 4)]),
            retry_page_divisor: 2,
            ..MigrationSettings::default()
        }
    }

    #[tokio::test]
    async fn test_retry_runs_at_reduced_page_size() -> Result<()> {
        let db = store().await?;
        let batch = seeded_batch(&db).await?;
        stage(
            &db,
            StagedTable::Entity(EntityKind::District),
            batch,
            &[&["2", "Süd", "1"], &["3", "Ost", "1"], &["4", "West", "0"]],
        )
        .await?;
        let orchestrator = MigrationOrchestrator::new(db.clone(), small_pages());

        let outcome = orchestrator.execute_unit(batch, &FaultyUnit::new()).await?;
        assert!(outcome.retried);
        assert_eq!(outcome.page_sizes, vec![4, 2]);
        // 4 staged rows at 2 per page
        assert_eq!(outcome.counters.pages, 2);
        assert_eq!(outcome.counters.succeeded, 4);
        assert_eq!(outcome.status, RunStatus::Success);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_retry_keeps_unit_failed() -> Result<()> {
        let db = store().await?;
        let batch = seeded_batch(&db).await?;
        let cancel = CancellationToken::new();
        let orchestrator = MigrationOrchestrator::new(db.clone(), small_pages())
            .with_cancellation(cancel.clone());
        let unit = FaultyUnit {
            attempts: AtomicUsize::new(0),
            cancel_on_failure: Some(cancel),
        };

        let outcome = orchestrator.execute_unit(batch, &unit).await?;
        assert!(outcome.retried);
        assert!(outcome.cancelled);
        assert_eq!(outcome.counters.processed, 0);
        assert_eq!(outcome.status, RunStatus::Error);

        let entry = BatchRegistry::new(db.clone())
            .entry(batch, "districts", Operation::Transform)
            .await?
            .unwrap();
        assert_eq!(entry.status, RunStatus::Error);
        let message = entry.message.unwrap();
        assert!(message.contains("retry was cancelled"));
        assert!(message.contains("target unreachable"));
        Ok(())
    }
}
