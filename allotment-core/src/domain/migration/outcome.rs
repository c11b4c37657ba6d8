// allotment-core/src/domain/migration/outcome.rs

//! Typed row and unit outcomes.
//!
//! A transform never signals "skip this row" through an error: each row
//! yields `Result<T, SkipReason>` and the results are folded into
//! [`UnitCounters`]. Only faults spanning a whole unit travel as errors.

use std::fmt;

use serde::Serialize;

use crate::domain::entity::EntityKind;
use crate::domain::migration::batch::{RunStatus, throughput};

/// Why a staged row was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingRequired { field: &'static str },
    Malformed { field: &'static str, value: String },
    UnresolvedReference { field: &'static str, value: String },
    Store { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequired { field } => write!(f, "required field '{}' is missing", field),
            Self::Malformed { field, value } => {
                write!(f, "required field '{}' is malformed: '{}'", field, value)
            }
            Self::UnresolvedReference { field, value } => {
                write!(f, "reference {}='{}' does not resolve", field, value)
            }
            Self::Store { message } => write!(f, "store rejected row: {}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitCounters {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Field-level conversion issues on rows that were still loaded.
    pub field_issues: u64,
    pub pages: u64,
}

impl UnitCounters {
    pub fn record_success(&mut self, field_issues: usize) {
        self.processed += 1;
        self.succeeded += 1;
        self.field_issues += field_issues as u64;
    }

    pub fn record_skip(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn merge(&mut self, other: &UnitCounters) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.field_issues += other.field_issues;
        self.pages += other.pages;
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.processed as f64
        }
    }

    /// Derives the run-log status of a unit.
    ///
    /// ERROR when the unit failed outright or when the failure ratio reaches
    /// `tolerance`; WARNING for any rejected row, field issue or cancellation.
    pub fn status(&self, unit_failed: bool, cancelled: bool, tolerance: f64) -> RunStatus {
        if unit_failed || (self.failed > 0 && self.failure_ratio() >= tolerance) {
            RunStatus::Error
        } else if self.failed > 0 || self.field_issues > 0 || cancelled {
            RunStatus::Warning
        } else {
            RunStatus::Success
        }
    }
}

/// Final outcome of one transformation unit within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub entity: EntityKind,
    pub status: RunStatus,
    pub counters: UnitCounters,
    pub message: Option<String>,
    pub duration_ms: i64,
    pub retried: bool,
    pub cancelled: bool,
    /// Page size of each attempt, the retry's last.
    pub page_sizes: Vec<usize>,
}

impl UnitOutcome {
    pub fn throughput_per_minute(&self) -> f64 {
        throughput(self.counters.succeeded, self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(processed: u64, failed: u64, field_issues: u64) -> UnitCounters {
        UnitCounters {
            processed,
            succeeded: processed - failed,
            failed,
            field_issues,
            pages: 1,
        }
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(counters(100, 0, 0).status(false, false, 0.1), RunStatus::Success);
        assert_eq!(counters(100, 0, 3).status(false, false, 0.1), RunStatus::Warning);
        assert_eq!(counters(100, 9, 0).status(false, false, 0.1), RunStatus::Warning);
        assert_eq!(counters(100, 10, 0).status(false, false, 0.1), RunStatus::Error);
        assert_eq!(counters(100, 0, 0).status(true, false, 0.1), RunStatus::Error);
        assert_eq!(counters(100, 0, 0).status(false, true, 0.1), RunStatus::Warning);
        assert_eq!(counters(0, 0, 0).status(false, false, 0.1), RunStatus::Success);
    }

    #[test]
    fn test_fold_rows() {
        let mut c = UnitCounters::default();
        c.record_success(0);
        c.record_success(2);
        c.record_skip();
        assert_eq!((c.processed, c.succeeded, c.failed, c.field_issues), (3, 2, 1, 2));
    }

    #[test]
    fn test_skip_reason_message() {
        let reason = SkipReason::UnresolvedReference {
            field: "application_ref",
            value: "4711".into(),
        };
        assert_eq!(
            reason.to_string(),
            "reference application_ref='4711' does not resolve"
        );
    }
}
