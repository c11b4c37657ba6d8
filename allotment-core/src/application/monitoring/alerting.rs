// allotment-core/src/application/monitoring/alerting.rs

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::monitoring::metrics::MetricStore;
use crate::application::store::{now, parse_ts, ts_param};
use crate::domain::monitoring::{
    AckOutcome, AlertDecision, AlertEvent, AlertRule, AlertRuleDefinition, AlertState, decide,
};
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, Row, SqlValue};
use crate::ports::notifier::{AlertNotification, AlertSink};

const EVENT_COLUMNS: &str = "id, rule_id, state, value, threshold, message, triggered_at, resolved_at, acknowledged_at, acknowledged_by";

fn rule_from_row(row: &Row) -> Result<AlertRule, AllotmentError> {
    Ok(AlertRule {
        id: row.int("id").unwrap_or_default(),
        name: row.text("name").unwrap_or_default(),
        metric_name: row.text("metric_name").unwrap_or_default(),
        operator: row.text("operator").unwrap_or_default().parse()?,
        threshold: row.float("threshold").unwrap_or_default(),
        severity: row.text("severity").unwrap_or_default().parse()?,
        window_minutes: row.int("window_minutes").unwrap_or(15),
        active: row.bool("active").unwrap_or(false),
    })
}

fn event_from_row(row: &Row) -> Result<AlertEvent, AllotmentError> {
    let ts = |c: &str| row.text(c).as_deref().and_then(parse_ts);
    Ok(AlertEvent {
        id: row.int("id").unwrap_or_default(),
        rule_id: row.int("rule_id").unwrap_or_default(),
        state: row.text("state").unwrap_or_default().parse::<AlertState>()?,
        value: row.float("value").unwrap_or_default(),
        threshold: row.float("threshold").unwrap_or_default(),
        message: row.text("message"),
        triggered_at: ts("triggered_at").unwrap_or_default(),
        resolved_at: ts("resolved_at"),
        acknowledged_at: ts("acknowledged_at"),
        acknowledged_by: row.text("acknowledged_by"),
    })
}

/// Counts of one alert evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertEvaluation {
    pub evaluated: usize,
    pub triggered: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Alert rule registry and the TRIGGERED → RESOLVED / ACKNOWLEDGED
/// state machine of alert events.
#[derive(Clone)]
pub struct AlertManager {
    connector: Arc<dyn Connector>,
    metrics: MetricStore,
    sink: Arc<dyn AlertSink>,
}

impl AlertManager {
    pub fn new(connector: Arc<dyn Connector>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            metrics: MetricStore::new(connector.clone()),
            connector,
            sink,
        }
    }

    /// Validates and upserts a rule by name.
    pub async fn register_rule(&self, def: &AlertRuleDefinition) -> Result<i64, AllotmentError> {
        def.check()?;
        let ts = ts_param(now());
        self.connector
            .execute_with(
                "INSERT INTO alert_rules (name, metric_name, operator, threshold, severity, window_minutes, active, description, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP)) \
                 ON CONFLICT (name) DO UPDATE SET metric_name = EXCLUDED.metric_name, operator = EXCLUDED.operator, \
                 threshold = EXCLUDED.threshold, severity = EXCLUDED.severity, window_minutes = EXCLUDED.window_minutes, \
                 active = EXCLUDED.active, description = EXCLUDED.description, updated_at = EXCLUDED.updated_at",
                &[
                    SqlValue::from(def.name.as_str()),
                    SqlValue::from(def.metric_name.as_str()),
                    SqlValue::from(def.operator.symbol()),
                    SqlValue::Float(def.threshold),
                    SqlValue::from(def.severity.as_str()),
                    SqlValue::Int(def.window_minutes),
                    SqlValue::Bool(def.active),
                    SqlValue::from(def.description.clone()),
                    ts.clone(),
                    ts,
                ],
            )
            .await?;

        self.connector
            .query_scalar(
                "SELECT id FROM alert_rules WHERE name = ?",
                &[SqlValue::from(def.name.as_str())],
            )
            .await?
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AllotmentError::InternalError(format!("alert rule {} vanished", def.name)))
    }

    pub async fn register_rules(&self, defs: &[AlertRuleDefinition]) -> Result<Vec<i64>, AllotmentError> {
        let mut ids = Vec::with_capacity(defs.len());
        for def in defs {
            ids.push(self.register_rule(def).await?);
        }
        Ok(ids)
    }

    pub async fn list_rules(&self) -> Result<Vec<AlertRule>, AllotmentError> {
        let rows = self
            .connector
            .query(
                "SELECT id, name, metric_name, operator, threshold, severity, window_minutes, active \
                 FROM alert_rules ORDER BY name",
                &[],
            )
            .await?;
        rows.iter().map(rule_from_row).collect()
    }

    /// The rule's unresolved event, TRIGGERED or ACKNOWLEDGED.
    async fn active_event(&self, rule_id: i64) -> Result<Option<AlertEvent>, AllotmentError> {
        let rows = self
            .connector
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM alert_events \
                     WHERE rule_id = ? AND resolved_at IS NULL AND state <> 'RESOLVED' \
                     ORDER BY id DESC LIMIT 1"
                ),
                &[SqlValue::Int(rule_id)],
            )
            .await?;
        rows.first().map(event_from_row).transpose()
    }

    /// Evaluates every active rule against the latest sample in its window.
    ///
    /// Re-evaluating a condition that still holds leaves the existing event
    /// untouched. A failing rule is logged and counted, never fatal.
    pub async fn evaluate_alert_rules(&self, at: NaiveDateTime) -> Result<AlertEvaluation, AllotmentError> {
        let mut summary = AlertEvaluation::default();
        for rule in self.list_rules().await?.into_iter().filter(|r| r.active) {
            summary.evaluated += 1;
            match self.evaluate_rule(&rule, at).await {
                Ok(AlertDecision::Trigger { .. }) => summary.triggered += 1,
                Ok(AlertDecision::Resolve { .. }) => summary.resolved += 1,
                Ok(AlertDecision::Unchanged) => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(rule = %rule.name, "Alert evaluation failed: {}", e);
                }
            }
        }
        debug!(?summary, "Alert rules evaluated");
        Ok(summary)
    }

    async fn evaluate_rule(&self, rule: &AlertRule, at: NaiveDateTime) -> Result<AlertDecision, AllotmentError> {
        let since = at - Duration::minutes(rule.window_minutes);
        let latest = self.metrics.latest_value_since(&rule.metric_name, since).await?;
        let active = self.active_event(rule.id).await?;

        let decision = decide(rule, latest, active.as_ref());
        match (decision, active) {
            (AlertDecision::Trigger { value }, _) => self.trigger(rule, value, at).await?,
            (AlertDecision::Resolve { value }, Some(event)) => {
                self.connector
                    .execute_with(
                        "UPDATE alert_events SET state = 'RESOLVED', resolved_at = CAST(? AS TIMESTAMP) WHERE id = ?",
                        &[ts_param(at), SqlValue::Int(event.id)],
                    )
                    .await?;
                info!(rule = %rule.name, value, event_id = event.id, "Alert resolved");
            }
            _ => {}
        }
        Ok(decision)
    }

    async fn trigger(&self, rule: &AlertRule, value: f64, at: NaiveDateTime) -> Result<(), AllotmentError> {
        let message = rule.describe(value);
        self.connector
            .execute_with(
                "INSERT INTO alert_events (rule_id, state, value, threshold, message, triggered_at) \
                 VALUES (?, 'TRIGGERED', ?, ?, ?, CAST(? AS TIMESTAMP))",
                &[
                    SqlValue::Int(rule.id),
                    SqlValue::Float(value),
                    SqlValue::Float(rule.threshold),
                    SqlValue::from(message.as_str()),
                    ts_param(at),
                ],
            )
            .await?;

        let notification = AlertNotification {
            rule_name: rule.name.clone(),
            severity: rule.severity,
            message,
            metric_value: value,
            threshold: rule.threshold,
            triggered_at: at,
        };
        // Fire-and-forget: delivery never holds up the evaluation
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.notify(notification).await {
                warn!("Alert notification failed: {}", e);
            }
        });
        Ok(())
    }

    /// TRIGGERED → ACKNOWLEDGED. Anything else reports `NotFound`.
    pub async fn acknowledge(&self, event_id: i64, actor: &str) -> Result<AckOutcome, AllotmentError> {
        let updated = self
            .connector
            .execute_with(
                "UPDATE alert_events SET state = 'ACKNOWLEDGED', acknowledged_at = CAST(? AS TIMESTAMP), acknowledged_by = ? \
                 WHERE id = ? AND state = 'TRIGGERED' AND resolved_at IS NULL",
                &[ts_param(now()), SqlValue::from(actor), SqlValue::Int(event_id)],
            )
            .await?;
        Ok(if updated > 0 {
            info!(event_id, actor, "Alert acknowledged");
            AckOutcome::Acknowledged
        } else {
            AckOutcome::NotFound
        })
    }

    /// Events newest first; `open_only` keeps TRIGGERED unresolved ones.
    pub async fn events(&self, open_only: bool, limit: usize) -> Result<Vec<AlertEvent>, AllotmentError> {
        let filter = if open_only {
            "WHERE state = 'TRIGGERED' AND resolved_at IS NULL"
        } else {
            ""
        };
        let rows = self
            .connector
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM alert_events {filter} ORDER BY id DESC LIMIT {limit}"),
                &[],
            )
            .await?;
        rows.iter().map(event_from_row).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::transform::testing::store;
    use crate::domain::error::DomainError;
    use crate::domain::monitoring::{Metric, MetricCategory};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<AlertNotification>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn notify(&self, notification: AlertNotification) -> Result<(), AllotmentError> {
            self.received.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn backlog_rule() -> AlertRuleDefinition {
        serde_yaml::from_str(
            "name: backlog_high\nmetric_name: backlog\noperator: '>'\nthreshold: 100\nseverity: ERROR\n",
        )
        .unwrap()
    }

    async fn sample(metrics: &MetricStore, value: f64, at: NaiveDateTime) -> Result<()> {
        metrics
            .record(&[Metric::new("backlog", MetricCategory::Business, value, "rows", at)])
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_trigger_once_then_resolve() -> Result<()> {
        let db = store().await?;
        let sink = Arc::new(RecordingSink::default());
        let manager = AlertManager::new(db.clone(), sink.clone());
        let metrics = MetricStore::new(db.clone());
        manager.register_rule(&backlog_rule()).await?;

        let t0 = now();
        let mut outcomes = Vec::new();
        for (i, value) in [150.0, 150.0, 80.0].into_iter().enumerate() {
            let at = t0 + Duration::seconds(i as i64);
            sample(&metrics, value, at).await?;
            outcomes.push(manager.evaluate_alert_rules(at).await?);
        }
        assert_eq!(outcomes[0].triggered, 1);
        assert_eq!((outcomes[1].triggered, outcomes[1].resolved), (0, 0));
        assert_eq!(outcomes[2].resolved, 1);

        let events = manager.events(false, 10).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, AlertState::Resolved);
        assert!(events[0].resolved_at.is_some());

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(sink.received.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_sample_in_window_changes_nothing() -> Result<()> {
        let db = store().await?;
        let manager = AlertManager::new(db.clone(), Arc::new(RecordingSink::default()));
        manager.register_rule(&backlog_rule()).await?;

        let at = now();
        sample(&MetricStore::new(db.clone()), 500.0, at - Duration::minutes(30)).await?;
        let outcome = manager.evaluate_alert_rules(at).await?;
        assert_eq!((outcome.evaluated, outcome.triggered), (1, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_acknowledge_only_open_events() -> Result<()> {
        let db = store().await?;
        let manager = AlertManager::new(db.clone(), Arc::new(RecordingSink::default()));
        manager.register_rule(&backlog_rule()).await?;
        let at = now();
        sample(&MetricStore::new(db.clone()), 150.0, at).await?;
        manager.evaluate_alert_rules(at).await?;

        let open = manager.events(true, 10).await?;
        assert_eq!(open.len(), 1);
        let id = open[0].id;

        assert_eq!(manager.acknowledge(id, "gartenamt").await?, AckOutcome::Acknowledged);
        assert_eq!(manager.acknowledge(id, "gartenamt").await?, AckOutcome::NotFound);
        assert_eq!(manager.acknowledge(id + 100, "gartenamt").await?, AckOutcome::NotFound);
        assert!(manager.events(true, 10).await?.is_empty());

        // An acknowledged alert still suppresses a new trigger
        let outcome = manager.evaluate_alert_rules(at).await?;
        assert_eq!(outcome.triggered, 0);
        let all = manager.events(false, 10).await?;
        assert_eq!(all[0].acknowledged_by.as_deref(), Some("gartenamt"));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_rule_rejected_at_registration() -> Result<()> {
        let db = store().await?;
        let manager = AlertManager::new(db, Arc::new(RecordingSink::default()));
        let mut rule = backlog_rule();
        rule.window_minutes = 0;
        assert!(matches!(
            manager.register_rule(&rule).await,
            Err(AllotmentError::Domain(DomainError::InvalidAlertRule { .. }))
        ));
        Ok(())
    }
}
