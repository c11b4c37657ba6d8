// allotment-core/src/domain/project/mod.rs

pub mod configuration;
pub use configuration::{MigrationSettings, MonitoringSettings, ProjectConfig, QualitySettings};
