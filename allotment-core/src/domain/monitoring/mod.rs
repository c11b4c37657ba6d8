pub mod alert;
pub mod metric;

pub use crate::domain::severity::Severity as AlertSeverity;
pub use alert::{
    AckOutcome, AlertDecision, AlertEvent, AlertRule, AlertRuleDefinition, AlertState, Operator,
    decide,
};
pub use metric::{Metric, MetricCategory};
