// allotment-core/src/domain/migration/batch.rs

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

const MAX_MESSAGE_LEN: usize = 2000;

#[allow(clippy::expect_used)]
static SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(password|passwd|pwd|token|secret|api[_-]?key|key)\s*[=:]\s*[^\s,;]+")
        .expect("literal secret pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchKind {
    Migration,
    Validation,
    Monitoring,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Migration => "MIGRATION",
            Self::Validation => "VALIDATION",
            Self::Monitoring => "MONITORING",
        }
    }
}

impl FromStr for BatchKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MIGRATION" => Ok(Self::Migration),
            "VALIDATION" => Ok(Self::Validation),
            "MONITORING" => Ok(Self::Monitoring),
            _ => Err(DomainError::UnknownValue {
                kind: "batch kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Unit of traceability for one migration or validation run.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub id: i64,
    pub kind: BatchKind,
    pub source: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Transform,
    Ingest,
    Validate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "TRANSFORM",
            Self::Ingest => "INGEST",
            Self::Validate => "VALIDATE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Started,
    Success,
    Warning,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Ordering used when folding several statuses into one.
    fn weight(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Started => 1,
            Self::Warning => 2,
            Self::Error => 3,
        }
    }

    pub fn worst<I: IntoIterator<Item = RunStatus>>(statuses: I) -> RunStatus {
        statuses
            .into_iter()
            .max_by_key(RunStatus::weight)
            .unwrap_or(RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STARTED" => Ok(Self::Started),
            "SUCCESS" => Ok(Self::Success),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(DomainError::UnknownValue {
                kind: "run status",
                value: s.to_string(),
            }),
        }
    }
}

/// One row per (batch, entity, operation).
#[derive(Debug, Clone, Serialize)]
pub struct RunLogEntry {
    pub id: i64,
    pub batch_id: i64,
    pub entity: String,
    pub operation: String,
    pub status: RunStatus,
    pub message: Option<String>,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub warnings: u64,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub duration_ms: Option<i64>,
}

impl RunLogEntry {
    /// Successful records per minute, `None` while the step is running.
    pub fn throughput_per_minute(&self) -> Option<f64> {
        let ms = self.duration_ms?;
        Some(throughput(self.succeeded, ms))
    }
}

pub fn throughput(succeeded: u64, duration_ms: i64) -> f64 {
    // Sub-millisecond units still report a finite rate
    let minutes = duration_ms.max(1) as f64 / 60_000.0;
    succeeded as f64 / minutes
}

/// Masks credentials and bounds the length of a message before it is persisted.
pub fn sanitize_message(message: &str) -> String {
    let masked = SECRET_RE.replace_all(message, "$1=***");
    if masked.chars().count() > MAX_MESSAGE_LEN {
        let mut truncated: String = masked.chars().take(MAX_MESSAGE_LEN).collect();
        truncated.push_str("...");
        truncated
    } else {
        masked.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_masks_credentials() {
        let msg = "connect failed: user=kgv password=hunter2, token: abc123 api_key=XYZ";
        let clean = sanitize_message(msg);
        assert!(!clean.contains("hunter2"));
        assert!(!clean.contains("abc123"));
        assert!(!clean.contains("XYZ"));
        assert!(clean.contains("user=kgv"));
        assert!(clean.contains("password=***"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 50);
        assert_eq!(sanitize_message(&long).chars().count(), MAX_MESSAGE_LEN + 3);
    }

    #[test]
    fn test_worst_status() {
        assert_eq!(
            RunStatus::worst([RunStatus::Success, RunStatus::Error, RunStatus::Warning]),
            RunStatus::Error
        );
        assert_eq!(RunStatus::worst([]), RunStatus::Success);
    }

    #[test]
    fn test_throughput_per_minute() {
        assert_eq!(throughput(120, 60_000), 120.0);
        assert_eq!(throughput(60, 30_000), 120.0);
        assert!(throughput(5, 0).is_finite());
    }
}
