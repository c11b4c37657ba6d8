// allotment-core/src/application/mod.rs

pub mod monitoring;
pub mod orchestrator;
pub mod quality;
pub mod registry;
pub mod report;
pub mod staging;
pub mod store;
pub mod transform;
pub mod validation;

// --- RE-EXPORTS (FACADE PATTERN) ---
// The CLI imports use cases from here without knowing the file layout.

pub use monitoring::{AlertManager, CycleReport, MonitoringService};
pub use orchestrator::{MigrationOrchestrator, MigrationRun};
pub use quality::QualityEngine;
pub use registry::BatchRegistry;
pub use report::write_migration_report;
pub use staging::{IngestSummary, StagedTable, StagingStore, ingest_directory};
pub use validation::MigrationValidation;
