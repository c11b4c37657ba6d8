// allotment-core/src/application/monitoring/collectors.rs

//! Metric collectors. Every probe query is isolated: a failing query is
//! logged and its metric skipped, the rest of the collection goes on.

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::application::store::ts_param;
use crate::domain::entity::EntityKind;
use crate::domain::monitoring::{Metric, MetricCategory};
use crate::domain::quality::rule::quote_ident;
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, SqlValue};

#[async_trait]
pub trait MetricCollector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn collect(&self, connector: &dyn Connector, at: NaiveDateTime) -> Vec<Metric>;
}

/// A single-value metric query.
struct Probe {
    name: &'static str,
    category: MetricCategory,
    unit: &'static str,
    sql: String,
    params: Vec<SqlValue>,
}

impl Probe {
    fn new(name: &'static str, category: MetricCategory, unit: &'static str, sql: impl Into<String>) -> Self {
        Self {
            name,
            category,
            unit,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn bind(mut self, param: SqlValue) -> Self {
        self.params.push(param);
        self
    }

    /// `None` when the query failed or returned no value.
    async fn run(&self, connector: &dyn Connector, at: NaiveDateTime) -> Option<Metric> {
        match connector.query_scalar(&self.sql, &self.params).await {
            Ok(value) => value
                .and_then(|v| v.as_f64())
                .map(|v| Metric::new(self.name, self.category, v, self.unit, at)),
            Err(e) => {
                warn!(metric = self.name, "Metric query failed: {}", e);
                None
            }
        }
    }
}

async fn run_probes(probes: &[Probe], connector: &dyn Connector, at: NaiveDateTime) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(probes.len());
    for probe in probes {
        if let Some(metric) = probe.run(connector, at).await {
            metrics.push(metric);
        }
    }
    metrics
}

/// Store health and capacity.
pub struct SystemCollector;

impl SystemCollector {
    async fn modifications(
        &self,
        connector: &dyn Connector,
        at: NaiveDateTime,
    ) -> Result<Vec<Metric>, AllotmentError> {
        let rows = connector
            .query(
                "SELECT entity, sum(succeeded) AS modified FROM run_log \
                 WHERE operation = 'TRANSFORM' AND completed_at >= CAST(? AS TIMESTAMP) \
                 GROUP BY entity ORDER BY entity",
                &[ts_param(at - Duration::hours(24))],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let entity = row.text("entity")?;
                let modified = row.float("modified").unwrap_or_default();
                Some(
                    Metric::new("entity_modifications_24h", MetricCategory::Performance, modified, "rows", at)
                        .with_tag("entity", entity),
                )
            })
            .collect())
    }
}

#[async_trait]
impl MetricCollector for SystemCollector {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn collect(&self, connector: &dyn Connector, at: NaiveDateTime) -> Vec<Metric> {
        // Availability is always reported, 0 when the store does not answer
        let available = connector.query_scalar("SELECT 1", &[]).await.is_ok();
        let mut metrics = vec![Metric::new(
            "store_available",
            MetricCategory::Availability,
            if available { 1.0 } else { 0.0 },
            "bool",
            at,
        )];
        if !available {
            return metrics;
        }

        let probes = [
            Probe::new(
                "worker_threads",
                MetricCategory::System,
                "threads",
                "SELECT CAST(current_setting('threads') AS BIGINT)",
            ),
            Probe::new(
                "table_count",
                MetricCategory::Capacity,
                "tables",
                "SELECT count(*) FROM duckdb_tables()",
            ),
            Probe::new(
                "storage_blocks_used",
                MetricCategory::Capacity,
                "blocks",
                "SELECT coalesce(sum(used_blocks), 0) FROM pragma_database_size()",
            ),
            Probe::new(
                "storage_utilization",
                MetricCategory::Capacity,
                "ratio",
                "SELECT CASE WHEN sum(total_blocks) > 0 \
                 THEN CAST(sum(used_blocks) AS DOUBLE) / sum(total_blocks) ELSE 0 END \
                 FROM pragma_database_size()",
            ),
        ];
        metrics.extend(run_probes(&probes, connector, at).await);

        for entity in EntityKind::ALL {
            let table = entity.target_table();
            let probe = Probe::new(
                "table_rows",
                MetricCategory::Capacity,
                "rows",
                format!("SELECT count(*) FROM {}", quote_ident(table)),
            );
            if let Some(metric) = probe.run(connector, at).await {
                metrics.push(metric.with_tag("table", table));
            }
        }

        match self.modifications(connector, at).await {
            Ok(m) => metrics.extend(m),
            Err(e) => warn!(metric = "entity_modifications_24h", "Metric query failed: {}", e),
        }

        debug!(collector = self.name(), count = metrics.len(), "Metrics collected");
        metrics
    }
}

/// Application volumes, waiting lists, latency and open quality errors.
pub struct BusinessCollector {
    latency_window_days: i64,
}

impl BusinessCollector {
    pub fn new(latency_window_days: i64) -> Self {
        Self { latency_window_days }
    }
}

#[async_trait]
impl MetricCollector for BusinessCollector {
    fn name(&self) -> &'static str {
        "business"
    }

    async fn collect(&self, connector: &dyn Connector, at: NaiveDateTime) -> Vec<Metric> {
        let today = SqlValue::Text(at.date().format("%Y-%m-%d").to_string());
        let probes = [
            Probe::new(
                "active_applications",
                MetricCategory::Business,
                "applications",
                "SELECT count(*) FROM applications WHERE coalesce(active, TRUE) AND deletion_date IS NULL",
            ),
            Probe::new(
                "waiting_list_32",
                MetricCategory::Business,
                "applications",
                "SELECT count(*) FROM applications WHERE waiting_list_32 IS NOT NULL AND coalesce(active, TRUE)",
            ),
            Probe::new(
                "waiting_list_33",
                MetricCategory::Business,
                "applications",
                "SELECT count(*) FROM applications WHERE waiting_list_33 IS NOT NULL AND coalesce(active, TRUE)",
            ),
            Probe::new(
                "applications_today",
                MetricCategory::Business,
                "applications",
                "SELECT count(*) FROM applications WHERE application_date = CAST(? AS DATE)",
            )
            .bind(today.clone()),
            Probe::new(
                "applications_this_month",
                MetricCategory::Business,
                "applications",
                "SELECT count(*) FROM applications \
                 WHERE date_trunc('month', application_date) = date_trunc('month', CAST(? AS DATE))",
            )
            .bind(today.clone()),
            Probe::new(
                "avg_processing_latency_days",
                MetricCategory::Performance,
                "days",
                format!(
                    "SELECT avg(date_diff('day', application_date, confirmation_date)) FROM applications \
                     WHERE application_date IS NOT NULL AND confirmation_date IS NOT NULL \
                     AND application_date >= CAST(? AS DATE) - INTERVAL {} DAY",
                    self.latency_window_days
                ),
            )
            .bind(today),
            Probe::new(
                "quality_error_violations",
                MetricCategory::Business,
                "violations",
                "SELECT coalesce(sum(violation_count), 0) FROM ( \
                 SELECT r.violation_count FROM quality_check_results AS r \
                 JOIN quality_rules AS q ON q.id = r.rule_id \
                 WHERE q.severity = 'ERROR' AND q.active \
                 QUALIFY row_number() OVER (PARTITION BY r.rule_id ORDER BY r.id DESC) = 1)",
            ),
        ];

        let metrics = run_probes(&probes, connector, at).await;
        debug!(collector = self.name(), count = metrics.len(), "Metrics collected");
        metrics
    }
}
