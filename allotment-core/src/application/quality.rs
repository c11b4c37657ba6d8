// allotment-core/src/application/quality.rs

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::application::store::{now, parse_ts, ts_param, u64_of};
use crate::domain::error::DomainError;
use crate::domain::quality::{
    CheckStatus, QualityCheckResult, QualityReport, QualityRule, RuleDefinition, order_results,
};
use crate::domain::severity::Severity;
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, Row, SqlValue};

const RULE_COLUMNS: &str =
    "id, name, table_name, column_name, rule_type, predicate, severity, active, description";

fn rule_from_row(row: &Row) -> Result<QualityRule, AllotmentError> {
    Ok(QualityRule {
        id: row.int("id").unwrap_or_default(),
        name: row.text("name").unwrap_or_default(),
        table: row.text("table_name").unwrap_or_default(),
        column: row.text("column_name"),
        rule_type: row.text("rule_type").unwrap_or_default().parse()?,
        predicate: row.text("predicate").unwrap_or_default(),
        severity: row.text("severity").unwrap_or_default().parse()?,
        active: row.bool("active").unwrap_or(false),
        description: row.text("description"),
    })
}

fn result_from_row(row: &Row) -> Result<QualityCheckResult, AllotmentError> {
    let samples = row
        .text("sample_violations")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    Ok(QualityCheckResult {
        id: row.int("id").unwrap_or_default(),
        batch_id: row.int("batch_id").unwrap_or_default(),
        rule_id: row.int("rule_id").unwrap_or_default(),
        rule_name: row.text("rule_name").unwrap_or_default(),
        table: row.text("table_name").unwrap_or_default(),
        severity: row.text("severity").unwrap_or_default().parse()?,
        violation_count: u64_of(row.int("violation_count")),
        sample_violations: samples,
        execution_ms: row.int("execution_ms").unwrap_or_default(),
        status: row.text("status").unwrap_or_default().parse()?,
        message: row.text("message"),
        checked_at: row
            .text("checked_at")
            .as_deref()
            .and_then(parse_ts)
            .unwrap_or_default(),
    })
}

/// Registry and evaluator of data-quality rules.
#[derive(Clone)]
pub struct QualityEngine {
    connector: Arc<dyn Connector>,
    sample_size: usize,
}

impl QualityEngine {
    pub fn new(connector: Arc<dyn Connector>, sample_size: usize) -> Self {
        Self {
            connector,
            sample_size: sample_size.max(1),
        }
    }

    /// Compiles and upserts a rule by name. Invalid declarations are
    /// rejected here and never stored.
    pub async fn register_rule(&self, definition: &RuleDefinition) -> Result<i64, AllotmentError> {
        let compiled = definition.compile()?;
        let def = &compiled.definition;
        let ts = ts_param(now());

        self.connector
            .execute_with(
                "INSERT INTO quality_rules (name, table_name, column_name, rule_type, predicate, severity, active, description, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP)) \
                 ON CONFLICT (name) DO UPDATE SET table_name = EXCLUDED.table_name, column_name = EXCLUDED.column_name, \
                 rule_type = EXCLUDED.rule_type, predicate = EXCLUDED.predicate, severity = EXCLUDED.severity, \
                 active = EXCLUDED.active, description = EXCLUDED.description, updated_at = EXCLUDED.updated_at",
                &[
                    SqlValue::from(def.name.as_str()),
                    SqlValue::from(def.table.as_str()),
                    SqlValue::from(def.column.clone()),
                    SqlValue::from(def.rule_type.as_str()),
                    SqlValue::from(compiled.predicate.as_str()),
                    SqlValue::from(def.severity.as_str()),
                    SqlValue::Bool(def.active),
                    SqlValue::from(def.description.clone()),
                    ts.clone(),
                    ts,
                ],
            )
            .await?;

        let id = self
            .connector
            .query_scalar(
                "SELECT id FROM quality_rules WHERE name = ?",
                &[SqlValue::from(def.name.as_str())],
            )
            .await?
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AllotmentError::InternalError(format!("rule {} vanished", def.name)))?;
        debug!(rule = %def.name, id, "Quality rule registered");
        Ok(id)
    }

    /// Registers every definition; stops at the first invalid one.
    pub async fn register_rules(&self, definitions: &[RuleDefinition]) -> Result<Vec<i64>, AllotmentError> {
        let mut ids = Vec::with_capacity(definitions.len());
        for def in definitions {
            ids.push(self.register_rule(def).await?);
        }
        Ok(ids)
    }

    pub async fn list_rules(&self) -> Result<Vec<QualityRule>, AllotmentError> {
        let rows = self
            .connector
            .query(&format!("SELECT {RULE_COLUMNS} FROM quality_rules ORDER BY name"), &[])
            .await?;
        rows.iter().map(rule_from_row).collect()
    }

    pub async fn get_rule(&self, rule_id: i64) -> Result<QualityRule, AllotmentError> {
        let rows = self
            .connector
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM quality_rules WHERE id = ?"),
                &[SqlValue::Int(rule_id)],
            )
            .await?;
        match rows.first() {
            Some(row) => rule_from_row(row),
            None => Err(DomainError::RuleNotFound(rule_id.to_string()).into()),
        }
    }

    /// Runs one rule against the current target data and records the result.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, rule_id: i64, batch_id: i64) -> Result<QualityCheckResult, AllotmentError> {
        let rule = self.get_rule(rule_id).await?;
        self.run_rule(&rule, batch_id).await
    }

    /// Evaluates every active rule matching the filters, ERROR rules first.
    ///
    /// A rule whose predicate fails is reported with status ERROR; it never
    /// stops the remaining rules.
    #[instrument(skip(self))]
    pub async fn evaluate_all(
        &self,
        batch_id: i64,
        table: Option<&str>,
        severity: Option<Severity>,
    ) -> Result<Vec<QualityCheckResult>, AllotmentError> {
        let mut rules: Vec<QualityRule> = self
            .list_rules()
            .await?
            .into_iter()
            .filter(|r| r.active)
            .filter(|r| table.is_none_or(|t| r.table.eq_ignore_ascii_case(t)))
            .filter(|r| severity.is_none_or(|s| r.severity == s))
            .collect();
        rules.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.name.cmp(&b.name)));

        let mut results = Vec::with_capacity(rules.len());
        for rule in &rules {
            match self.run_rule(rule, batch_id).await {
                Ok(result) => results.push(result),
                Err(e) => warn!(rule = %rule.name, "Quality result not recorded: {}", e),
            }
        }
        order_results(&mut results);

        let violated = results.iter().filter(|r| r.violation_count > 0).count();
        info!(batch_id, rules = results.len(), violated, "Quality evaluation finished");
        Ok(results)
    }

    /// Per-severity aggregation of the latest result of each rule in the batch.
    pub async fn generate_report(&self, batch_id: i64) -> Result<QualityReport, AllotmentError> {
        let results = self.results(batch_id).await?;
        Ok(QualityReport::build(batch_id, &results, now()))
    }

    /// Latest result of each rule evaluated in the batch, in report order.
    pub async fn results(&self, batch_id: i64) -> Result<Vec<QualityCheckResult>, AllotmentError> {
        let rows = self
            .connector
            .query(
                "SELECT r.id, r.batch_id, r.rule_id, q.name AS rule_name, q.table_name, q.severity, \
                 r.violation_count, r.sample_violations, r.execution_ms, r.status, r.message, r.checked_at \
                 FROM quality_check_results AS r JOIN quality_rules AS q ON q.id = r.rule_id \
                 WHERE r.batch_id = ? \
                 QUALIFY row_number() OVER (PARTITION BY r.rule_id ORDER BY r.id DESC) = 1",
                &[SqlValue::Int(batch_id)],
            )
            .await?;
        let mut results = rows.iter().map(result_from_row).collect::<Result<Vec<_>, _>>()?;
        order_results(&mut results);
        Ok(results)
    }

    async fn run_rule(&self, rule: &QualityRule, batch_id: i64) -> Result<QualityCheckResult, AllotmentError> {
        let start = Instant::now();
        let checked = self.count_and_sample(&rule.predicate).await;
        let execution_ms = start.elapsed().as_millis() as i64;

        let (violation_count, samples, status, message) = match checked {
            Ok((0, _)) => (0, Vec::new(), CheckStatus::Passed, None),
            Ok((count, samples)) => (count, samples, CheckStatus::Failed, None),
            Err(e) => {
                warn!(rule = %rule.name, "Rule evaluation failed: {}", e);
                (0, Vec::new(), CheckStatus::Error, Some(e.to_string()))
            }
        };

        let checked_at = now();
        let id = self
            .connector
            .query_scalar("SELECT nextval('seq_quality_check_results')", &[])
            .await?
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AllotmentError::InternalError("result sequence returned nothing".into()))?;
        self.connector
            .execute_with(
                "INSERT INTO quality_check_results (id, batch_id, rule_id, violation_count, sample_violations, execution_ms, status, message, checked_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
                &[
                    SqlValue::Int(id),
                    SqlValue::Int(batch_id),
                    SqlValue::Int(rule.id),
                    SqlValue::Int(violation_count as i64),
                    SqlValue::Text(serde_json::to_string(&samples)?),
                    SqlValue::Int(execution_ms),
                    SqlValue::from(status.as_str()),
                    SqlValue::from(message.clone()),
                    ts_param(checked_at),
                ],
            )
            .await?;

        debug!(rule = %rule.name, violations = violation_count, "Rule evaluated");
        Ok(QualityCheckResult {
            id,
            batch_id,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            table: rule.table.clone(),
            severity: rule.severity,
            violation_count,
            sample_violations: samples,
            execution_ms,
            status,
            message,
            checked_at,
        })
    }

    /// True violation count plus at most `sample_size` violating rows.
    async fn count_and_sample(
        &self,
        predicate: &str,
    ) -> Result<(u64, Vec<serde_json::Value>), AllotmentError> {
        let count = self
            .connector
            .query_scalar(&format!("SELECT count(*) FROM ({predicate}) AS violations"), &[])
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if count == 0 {
            return Ok((0, Vec::new()));
        }

        let rows = self
            .connector
            .query(
                &format!("SELECT * FROM ({predicate}) AS violations LIMIT {}", self.sample_size),
                &[],
            )
            .await?;
        Ok((count.max(0) as u64, rows.iter().map(Row::to_json).collect()))
    }
}
