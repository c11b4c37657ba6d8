// allotment-core/src/domain/quality/report.rs

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::error::DomainError;
use crate::domain::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Passed,
    Failed,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "ERROR" => Ok(Self::Error),
            _ => Err(DomainError::UnknownValue {
                kind: "check status",
                value: s.to_string(),
            }),
        }
    }
}

/// Outcome of one rule for one evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct QualityCheckResult {
    pub id: i64,
    pub batch_id: i64,
    pub rule_id: i64,
    pub rule_name: String,
    pub table: String,
    pub severity: Severity,
    pub violation_count: u64,
    /// Bounded to the configured sample size, never the full set.
    pub sample_violations: Vec<serde_json::Value>,
    pub execution_ms: i64,
    pub status: CheckStatus,
    pub message: Option<String>,
    pub checked_at: NaiveDateTime,
}

/// ERROR before WARNING before INFO; most violated first within a severity.
pub fn order_results(results: &mut [QualityCheckResult]) {
    results.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then(b.violation_count.cmp(&a.violation_count))
            .then(a.rule_name.cmp(&b.rule_name))
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct SeveritySummary {
    pub severity: Severity,
    pub rules_run: usize,
    pub rules_violated: usize,
    pub rules_errored: usize,
    pub total_violations: u64,
    pub avg_execution_ms: f64,
    pub worst_rule: Option<String>,
    pub worst_violations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub batch_id: i64,
    pub generated_at: NaiveDateTime,
    pub rules_run: usize,
    pub total_violations: u64,
    pub by_severity: Vec<SeveritySummary>,
}

impl QualityReport {
    pub fn build(batch_id: i64, results: &[QualityCheckResult], generated_at: NaiveDateTime) -> Self {
        let by_severity: Vec<SeveritySummary> = Severity::ALL
            .into_iter()
            .map(|severity| summarize(severity, results))
            .filter(|s| s.rules_run > 0)
            .collect();

        Self {
            batch_id,
            generated_at,
            rules_run: results.len(),
            total_violations: results.iter().map(|r| r.violation_count).sum(),
            by_severity,
        }
    }

    pub fn violations_at(&self, severity: Severity) -> u64 {
        self.by_severity
            .iter()
            .filter(|s| s.severity == severity)
            .map(|s| s.total_violations)
            .sum()
    }
}

fn summarize(severity: Severity, results: &[QualityCheckResult]) -> SeveritySummary {
    let scoped: Vec<&QualityCheckResult> =
        results.iter().filter(|r| r.severity == severity).collect();

    let worst = scoped
        .iter()
        .filter(|r| r.violation_count > 0)
        .max_by(|a, b| {
            a.violation_count
                .cmp(&b.violation_count)
                .then(b.rule_name.cmp(&a.rule_name))
        });

    let avg_execution_ms = if scoped.is_empty() {
        0.0
    } else {
        scoped.iter().map(|r| r.execution_ms as f64).sum::<f64>() / scoped.len() as f64
    };

    SeveritySummary {
        severity,
        rules_run: scoped.len(),
        rules_violated: scoped.iter().filter(|r| r.violation_count > 0).count(),
        rules_errored: scoped
            .iter()
            .filter(|r| r.status == CheckStatus::Error)
            .count(),
        total_violations: scoped.iter().map(|r| r.violation_count).sum(),
        avg_execution_ms,
        worst_rule: worst.map(|r| r.rule_name.clone()),
        worst_violations: worst.map(|r| r.violation_count).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, severity: Severity, violations: u64, ms: i64) -> QualityCheckResult {
        QualityCheckResult {
            id: 0,
            batch_id: 1,
            rule_id: 0,
            rule_name: name.into(),
            table: "applications".into(),
            severity,
            violation_count: violations,
            sample_violations: vec![],
            execution_ms: ms,
            status: if violations > 0 {
                CheckStatus::Failed
            } else {
                CheckStatus::Passed
            },
            message: None,
            checked_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_ordering_severity_then_violations() {
        let mut results = vec![
            result("info_a", Severity::Info, 90, 1),
            result("warn_few", Severity::Warning, 2, 1),
            result("err_none", Severity::Error, 0, 1),
            result("warn_many", Severity::Warning, 40, 1),
            result("err_some", Severity::Error, 5, 1),
        ];
        order_results(&mut results);
        let names: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["err_some", "err_none", "warn_many", "warn_few", "info_a"]
        );
    }

    #[test]
    fn test_report_aggregates_per_severity() {
        let results = vec![
            result("a", Severity::Error, 3, 10),
            result("b", Severity::Error, 7, 30),
            result("c", Severity::Error, 0, 20),
            result("d", Severity::Info, 1, 4),
        ];
        let report = QualityReport::build(1, &results, NaiveDateTime::default());

        assert_eq!(report.rules_run, 4);
        assert_eq!(report.total_violations, 11);
        assert_eq!(report.by_severity.len(), 2);

        let errors = &report.by_severity[0];
        assert_eq!(errors.severity, Severity::Error);
        assert_eq!(errors.rules_run, 3);
        assert_eq!(errors.rules_violated, 2);
        assert_eq!(errors.total_violations, 10);
        assert_eq!(errors.avg_execution_ms, 20.0);
        assert_eq!(errors.worst_rule.as_deref(), Some("b"));
        assert_eq!(report.violations_at(Severity::Warning), 0);
    }
}
