// allotment-core/src/application/monitoring/cycle.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::application::monitoring::alerting::AlertManager;
use crate::application::monitoring::collectors::{BusinessCollector, MetricCollector, SystemCollector};
use crate::application::monitoring::metrics::MetricStore;
use crate::application::store::now;
use crate::domain::project::MonitoringSettings;
use crate::error::AllotmentError;
use crate::ports::connector::Connector;
use crate::ports::notifier::AlertSink;

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub collected_at: NaiveDateTime,
    pub metrics_collected: usize,
    pub alerts_evaluated: usize,
    pub triggered: usize,
    pub resolved: usize,
    pub failed_rules: usize,
}

/// One collect → persist → evaluate pass, or a loop of them.
pub struct MonitoringService {
    connector: Arc<dyn Connector>,
    collectors: Vec<Box<dyn MetricCollector>>,
    metrics: MetricStore,
    alerts: AlertManager,
}

impl MonitoringService {
    pub fn new(
        connector: Arc<dyn Connector>,
        sink: Arc<dyn AlertSink>,
        settings: &MonitoringSettings,
    ) -> Self {
        Self {
            collectors: vec![
                Box::new(SystemCollector),
                Box::new(BusinessCollector::new(settings.latency_window_days)),
            ],
            metrics: MetricStore::new(connector.clone()),
            alerts: AlertManager::new(connector.clone(), sink),
            connector,
        }
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn metrics(&self) -> &MetricStore {
        &self.metrics
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, AllotmentError> {
        let at = now();
        let collected = join_all(
            self.collectors
                .iter()
                .map(|c| c.collect(self.connector.as_ref(), at)),
        )
        .await;
        let metrics: Vec<_> = collected.into_iter().flatten().collect();
        let recorded = self.metrics.record(&metrics).await?;

        let evaluation = self.alerts.evaluate_alert_rules(at).await?;
        info!(
            metrics = recorded,
            rules = evaluation.evaluated,
            triggered = evaluation.triggered,
            resolved = evaluation.resolved,
            "Monitoring cycle complete"
        );
        Ok(CycleReport {
            collected_at: at,
            metrics_collected: recorded,
            alerts_evaluated: evaluation.evaluated,
            triggered: evaluation.triggered,
            resolved: evaluation.resolved,
            failed_rules: evaluation.failed,
        })
    }

    /// Runs a cycle every `every` until `cancel` fires; returns the number
    /// of completed cycles. A failed cycle is logged and the loop goes on.
    pub async fn run_loop(&self, every: Duration, cancel: CancellationToken) -> usize {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut cycles = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(cycles, "Monitoring loop stopped");
                    return cycles;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(_) => cycles += 1,
                        Err(e) => warn!("Monitoring cycle failed: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::transform::testing::store;
    use crate::domain::monitoring::{AlertRuleDefinition, AlertState};
    use crate::infrastructure::adapters::TracingAlertSink;
    use anyhow::Result;

    #[tokio::test]
    async fn test_cycle_collects_and_triggers() -> Result<()> {
        let db = store().await?;
        let service = MonitoringService::new(db.clone(), Arc::new(TracingAlertSink), &MonitoringSettings::default());
        let rule: AlertRuleDefinition = serde_yaml::from_str(
            "name: store_up\nmetric_name: store_available\noperator: '>='\nthreshold: 1\nseverity: INFO\n",
        )?;
        service.alerts().register_rule(&rule).await?;

        let report = service.run_cycle().await?;
        assert!(report.metrics_collected > 5);
        assert_eq!((report.alerts_evaluated, report.triggered), (1, 1));

        // Condition still holds: nothing new
        let again = service.run_cycle().await?;
        assert_eq!(again.triggered, 0);
        let events = service.alerts().events(false, 10).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, AlertState::Triggered);

        let samples = service.metrics().recent(Some("store_available"), 10).await?;
        assert_eq!(samples.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() -> Result<()> {
        let db = store().await?;
        let service = MonitoringService::new(db, Arc::new(TracingAlertSink), &MonitoringSettings::default());
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stopper.cancel();
        });
        let cycles = service.run_loop(Duration::from_millis(40), cancel).await;
        assert!(cycles >= 1);
        Ok(())
    }
}
