// allotment/src/commands/project.rs
//
// Shared wiring: configuration, store connection and schema bootstrap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use allotment_core::application::BatchRegistry;
use allotment_core::domain::migration::BatchKind;
use allotment_core::infrastructure::adapters::DuckDBConnector;
use allotment_core::infrastructure::config::{ProjectConfig, load_project_config};
use allotment_core::infrastructure::schema::bootstrap;
use allotment_core::ports::connector::Connector;
use anyhow::Context;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use tracing::debug;

pub struct Project {
    pub dir: PathBuf,
    pub config: ProjectConfig,
    pub connector: Arc<dyn Connector>,
}

impl Project {
    pub async fn open(project_dir: &Path) -> anyhow::Result<Self> {
        let config = load_project_config(project_dir).with_context(|| {
            format!(
                "Failed to load project configuration from {:?}",
                project_dir
            )
        })?;

        let location = config.database_location(project_dir);
        let connector: Arc<dyn Connector> = Arc::new(
            DuckDBConnector::new(&location)
                .with_context(|| format!("Failed to open DuckDB at {}", location))?,
        );
        bootstrap(connector.as_ref())
            .await
            .context("Failed to bootstrap the store schema")?;
        debug!(database = %location, engine = connector.engine_name(), "Store opened");

        Ok(Self {
            dir: project_dir.to_path_buf(),
            config,
            connector,
        })
    }

    pub fn registry(&self) -> BatchRegistry {
        BatchRegistry::new(self.connector.clone())
    }

    /// `batch`, or the latest batch of `kind` when none is given.
    pub async fn resolve_batch(&self, batch: Option<i64>, kind: BatchKind) -> anyhow::Result<i64> {
        let registry = self.registry();
        match batch {
            Some(id) => Ok(registry.get_batch(id).await?.id),
            None => registry
                .latest_batch(Some(kind))
                .await?
                .map(|b| b.id)
                .with_context(|| {
                    format!("No {} batch found. 👉 Have you run 'allotment ingest'?", kind.as_str())
                }),
        }
    }
}

pub fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
