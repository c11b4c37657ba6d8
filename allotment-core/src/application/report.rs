// allotment-core/src/application/report.rs

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::application::orchestrator::MigrationRun;
use crate::application::store::now;
use crate::application::validation::MigrationValidation;
use crate::domain::entity::EntityKind;
use crate::domain::migration::{EntityProgress, RunLogEntry, RunStatus, UnitCounters};
use crate::error::AllotmentError;
use crate::infrastructure::fs::write_json;

/// JSON document left in the target directory after each migration run.
#[derive(Debug, Serialize)]
pub struct MigrationReport<'a> {
    pub batch_id: i64,
    pub generated_at: NaiveDateTime,
    pub status: RunStatus,
    pub duration_ms: i64,
    pub totals: UnitCounters,
    pub retried: Vec<EntityKind>,
    pub skipped: &'a [EntityKind],
    pub entries: &'a [RunLogEntry],
    pub summary: &'a [EntityProgress],
    /// `record_counts`, `integrity_checks` and `quality_checks` at top level.
    #[serde(flatten)]
    pub validation: &'a MigrationValidation,
}

impl<'a> MigrationReport<'a> {
    pub fn from_run(run: &'a MigrationRun) -> Self {
        let mut totals = UnitCounters::default();
        for outcome in &run.outcomes {
            totals.merge(&outcome.counters);
        }
        Self {
            batch_id: run.batch_id,
            generated_at: now(),
            status: run.status,
            duration_ms: run.duration_ms,
            totals,
            retried: run.outcomes.iter().filter(|o| o.retried).map(|o| o.entity).collect(),
            skipped: &run.skipped,
            entries: &run.entries,
            summary: &run.summary,
            validation: &run.validation,
        }
    }
}

pub fn report_path(target_dir: &Path, batch_id: i64) -> PathBuf {
    target_dir.join(format!("migration_report_{}.json", batch_id))
}

/// Writes the report of `run` atomically and returns its path.
pub fn write_migration_report(
    target_dir: &Path,
    run: &MigrationRun,
) -> Result<PathBuf, AllotmentError> {
    let path = report_path(target_dir, run.batch_id);
    write_json(&path, &MigrationReport::from_run(run))?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::migration::UnitOutcome;
    use anyhow::Result;
    use tempfile::tempdir;

    fn outcome(entity: EntityKind, succeeded: u64, failed: u64, retried: bool) -> UnitOutcome {
        UnitOutcome {
            entity,
            status: RunStatus::Success,
            counters: UnitCounters {
                processed: succeeded + failed,
                succeeded,
                failed,
                field_issues: 0,
                pages: 1,
            },
            message: None,
            duration_ms: 10,
            retried,
            cancelled: false,
            page_sizes: vec![100],
        }
    }

    #[test]
    fn test_report_totals_and_location() -> Result<()> {
        let dir = tempdir()?;
        let run = MigrationRun {
            batch_id: 7,
            status: RunStatus::Warning,
            outcomes: vec![
                outcome(EntityKind::District, 3, 0, false),
                outcome(EntityKind::Application, 10, 2, true),
            ],
            entries: vec![],
            summary: vec![],
            skipped: vec![EntityKind::FieldMapping],
            validation: MigrationValidation {
                record_counts: [("districts".to_string(), 3)].into(),
                integrity_checks: [("orphaned_cadastral_districts".to_string(), 1)].into(),
                ..MigrationValidation::default()
            },
            duration_ms: 25,
        };

        let path = write_migration_report(&dir.path().join("target"), &run)?;
        assert!(path.ends_with("migration_report_7.json"));

        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(doc["status"], "WARNING");
        assert_eq!(doc["totals"]["processed"], 15);
        assert_eq!(doc["totals"]["failed"], 2);
        assert_eq!(doc["retried"][0], "application");
        assert_eq!(doc["skipped"][0], "field_mapping");
        assert_eq!(doc["record_counts"]["districts"], 3);
        assert_eq!(doc["integrity_checks"]["orphaned_cadastral_districts"], 1);
        assert!(doc.get("error").is_none());
        Ok(())
    }
}
