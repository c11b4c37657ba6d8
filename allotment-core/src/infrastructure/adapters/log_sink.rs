// allotment-core/src/infrastructure/adapters/log_sink.rs

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::monitoring::AlertSeverity;
use crate::error::AllotmentError;
use crate::ports::notifier::{AlertNotification, AlertSink};

/// Default notification sink: alerts become structured log events.
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, n: AlertNotification) -> Result<(), AllotmentError> {
        match n.severity {
            AlertSeverity::Error => error!(
                rule = %n.rule_name,
                value = n.metric_value,
                threshold = n.threshold,
                triggered_at = %n.triggered_at,
                "🚨 {}",
                n.message
            ),
            AlertSeverity::Warning => warn!(
                rule = %n.rule_name,
                value = n.metric_value,
                threshold = n.threshold,
                triggered_at = %n.triggered_at,
                "⚠️  {}",
                n.message
            ),
            AlertSeverity::Info => info!(
                rule = %n.rule_name,
                value = n.metric_value,
                threshold = n.threshold,
                triggered_at = %n.triggered_at,
                "ℹ️  {}",
                n.message
            ),
        }
        Ok(())
    }
}
