// allotment-core/src/application/monitoring/metrics.rs

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::application::store::{parse_ts, ts_param};
use crate::domain::monitoring::{Metric, MetricCategory};
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, SqlValue};

/// Append-only metric series persisted in the `metrics` table.
#[derive(Clone)]
pub struct MetricStore {
    connector: Arc<dyn Connector>,
}

impl MetricStore {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    pub async fn record(&self, metrics: &[Metric]) -> Result<usize, AllotmentError> {
        for metric in metrics {
            let tags = if metric.tags.is_empty() {
                SqlValue::Null
            } else {
                SqlValue::Text(serde_json::to_string(&metric.tags)?)
            };
            self.connector
                .execute_with(
                    "INSERT INTO metrics (name, category, value, unit, tags, recorded_at) \
                     VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
                    &[
                        SqlValue::from(metric.name.as_str()),
                        SqlValue::from(metric.category.as_str()),
                        SqlValue::Float(metric.value),
                        SqlValue::from(metric.unit.as_str()),
                        tags,
                        ts_param(metric.timestamp),
                    ],
                )
                .await?;
        }
        Ok(metrics.len())
    }

    /// Most recent untagged sample of `name` recorded at or after `since`.
    pub async fn latest_value_since(
        &self,
        name: &str,
        since: NaiveDateTime,
    ) -> Result<Option<f64>, AllotmentError> {
        let value = self
            .connector
            .query_scalar(
                "SELECT value FROM metrics WHERE name = ? AND tags IS NULL \
                 AND recorded_at >= CAST(? AS TIMESTAMP) ORDER BY recorded_at DESC, id DESC LIMIT 1",
                &[SqlValue::from(name), ts_param(since)],
            )
            .await?;
        Ok(value.and_then(|v| v.as_f64()))
    }

    /// Latest samples, newest first, optionally restricted to one name.
    pub async fn recent(&self, name: Option<&str>, limit: usize) -> Result<Vec<Metric>, AllotmentError> {
        let (filter, params) = match name {
            Some(n) => ("WHERE name = ?", vec![SqlValue::from(n)]),
            None => ("", Vec::new()),
        };
        let rows = self
            .connector
            .query(
                &format!(
                    "SELECT name, category, value, unit, tags, recorded_at FROM metrics {filter} \
                     ORDER BY recorded_at DESC, id DESC LIMIT {limit}"
                ),
                &params,
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<Metric, AllotmentError> {
                Ok(Metric {
                    name: row.text("name").unwrap_or_default(),
                    category: row.text("category").unwrap_or_default().parse::<MetricCategory>()?,
                    value: row.float("value").unwrap_or_default(),
                    unit: row.text("unit").unwrap_or_default(),
                    tags: row
                        .text("tags")
                        .and_then(|t| serde_json::from_str(&t).ok())
                        .unwrap_or_default(),
                    timestamp: row
                        .text("recorded_at")
                        .as_deref()
                        .and_then(parse_ts)
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}
