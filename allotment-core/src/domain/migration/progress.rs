// allotment-core/src/domain/migration/progress.rs

use serde::Serialize;

use crate::domain::entity::EntityKind;
use crate::domain::migration::batch::{RunLogEntry, RunStatus};

/// Per-entity progress view of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct EntityProgress {
    pub entity: EntityKind,
    pub staged: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub status: Option<RunStatus>,
    /// processed / staged, in percent. 100 when nothing was staged.
    pub completion_pct: f64,
    pub throughput_per_min: Option<f64>,
    pub eta_secs: Option<f64>,
    /// succeeded / processed, `None` before the first processed row.
    pub quality_score: Option<f64>,
}

impl EntityProgress {
    pub fn compute(entity: EntityKind, staged: u64, entry: Option<&RunLogEntry>) -> Self {
        let (processed, succeeded, failed) = entry
            .map(|e| (e.processed, e.succeeded, e.failed))
            .unwrap_or((0, 0, 0));

        let completion_pct = if staged == 0 {
            100.0
        } else {
            (processed as f64 / staged as f64 * 100.0).min(100.0)
        };

        let throughput_per_min = entry.and_then(RunLogEntry::throughput_per_minute);
        let remaining = staged.saturating_sub(processed);
        let eta_secs = match throughput_per_min {
            _ if remaining == 0 => Some(0.0),
            Some(rate) if rate > 0.0 => Some(remaining as f64 / rate * 60.0),
            _ => None,
        };

        let quality_score = (processed > 0).then(|| succeeded as f64 / processed as f64);

        Self {
            entity,
            staged,
            processed,
            succeeded,
            failed,
            status: entry.map(|e| e.status),
            completion_pct,
            throughput_per_min,
            eta_secs,
            quality_score,
        }
    }
}
