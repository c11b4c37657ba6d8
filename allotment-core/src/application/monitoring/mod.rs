// allotment-core/src/application/monitoring/mod.rs

pub mod alerting;
pub mod collectors;
pub mod cycle;
pub mod metrics;

pub use alerting::{AlertEvaluation, AlertManager};
pub use collectors::{BusinessCollector, MetricCollector, SystemCollector};
pub use cycle::{CycleReport, MonitoringService};
pub use metrics::MetricStore;
