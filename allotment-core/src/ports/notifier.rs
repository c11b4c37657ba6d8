// allotment-core/src/ports/notifier.rs

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::monitoring::AlertSeverity;
use crate::error::AllotmentError;

/// Payload handed to the notification sink when an alert rule triggers.
#[derive(Debug, Clone, Serialize)]
pub struct AlertNotification {
    pub rule_name: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub metric_value: f64,
    pub threshold: f64,
    pub triggered_at: NaiveDateTime,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, notification: AlertNotification) -> Result<(), AllotmentError>;
}
