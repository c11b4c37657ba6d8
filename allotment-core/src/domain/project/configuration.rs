// allotment-core/src/domain/project/configuration.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::entity::EntityKind;
use crate::domain::monitoring::AlertRuleDefinition;
use crate::domain::quality::RuleDefinition;

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct ProjectConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,

    /// DuckDB file holding staging, target and operational tables, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(rename = "config-paths", default = "default_config_paths")]
    pub config_paths: Vec<String>,

    /// Directory of legacy CSV exports (`<entity>.csv`).
    #[serde(rename = "data-path", default = "default_data_path")]
    pub data_path: String,

    #[serde(rename = "target-path", default = "default_target_path")]
    pub target_path: String,

    #[validate(nested)]
    #[serde(default)]
    pub migration: MigrationSettings,

    #[validate(nested)]
    #[serde(default)]
    pub quality: QualitySettings,

    #[validate(nested)]
    #[serde(default)]
    pub monitoring: MonitoringSettings,

    // Hydrated from satellite files
    #[serde(skip)]
    pub quality_rules: Vec<RuleDefinition>,
    #[serde(skip)]
    pub alert_rules: Vec<AlertRuleDefinition>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            database: default_database(),
            config_paths: default_config_paths(),
            data_path: default_data_path(),
            target_path: default_target_path(),
            migration: MigrationSettings::default(),
            quality: QualitySettings::default(),
            monitoring: MonitoringSettings::default(),
            quality_rules: Vec::new(),
            alert_rules: Vec::new(),
        }
    }

    /// Database location resolved against the project directory.
    pub fn database_location(&self, project_dir: &Path) -> String {
        if self.database == ":memory:" {
            return self.database.clone();
        }
        resolve(project_dir, &self.database).to_string_lossy().into_owned()
    }

    pub fn data_dir(&self, project_dir: &Path) -> PathBuf {
        resolve(project_dir, &self.data_path)
    }

    pub fn target_dir(&self, project_dir: &Path) -> PathBuf {
        resolve(project_dir, &self.target_path)
    }
}

fn resolve(project_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        project_dir.join(p)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct MigrationSettings {
    #[validate(range(min = 1, max = 1_000_000))]
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Per-entity page size override, keyed by target table name.
    #[serde(default = "default_page_sizes")]
    pub page_sizes: BTreeMap<String, usize>,

    /// The single retry of a failed unit runs at `page_size / retry_page_divisor`.
    #[validate(range(min = 2, max = 1000))]
    #[serde(default = "default_retry_divisor")]
    pub retry_page_divisor: usize,

    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,

    /// Failure ratio from which a unit is reported as ERROR instead of WARNING.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_error_tolerance")]
    pub error_tolerance: f64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            page_sizes: default_page_sizes(),
            retry_page_divisor: default_retry_divisor(),
            max_concurrency: default_concurrency(),
            error_tolerance: default_error_tolerance(),
        }
    }
}

impl MigrationSettings {
    pub fn page_size_for(&self, entity: EntityKind) -> usize {
        self.page_sizes
            .get(entity.as_str())
            .copied()
            .unwrap_or(self.default_page_size)
            .max(1)
    }

    pub fn retry_page_size(&self, page_size: usize) -> usize {
        (page_size / self.retry_page_divisor.max(1)).max(1)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct QualitySettings {
    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct MonitoringSettings {
    #[validate(range(min = 1))]
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[validate(range(min = 1, max = 3650))]
    #[serde(default = "default_latency_window")]
    pub latency_window_days: i64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            latency_window_days: default_latency_window(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}
fn default_database() -> String {
    "target/allotment.duckdb".to_string()
}
fn default_config_paths() -> Vec<String> {
    vec!["config".to_string()]
}
fn default_data_path() -> String {
    "data".to_string()
}
fn default_target_path() -> String {
    "target".to_string()
}
fn default_page_size() -> usize {
    1000
}
fn default_page_sizes() -> BTreeMap<String, usize> {
    BTreeMap::from([(EntityKind::Application.as_str().to_string(), 2000)])
}
fn default_retry_divisor() -> usize {
    4
}
fn default_concurrency() -> usize {
    4
}
fn default_error_tolerance() -> f64 {
    0.1
}
fn default_sample_size() -> usize {
    10
}
fn default_interval() -> u64 {
    300
}
fn default_latency_window() -> i64 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_yaml() -> anyhow::Result<()> {
        let cfg: ProjectConfig = serde_yaml::from_str("name: kgv\n")?;
        cfg.validate()?;
        assert_eq!(cfg.migration.page_size_for(EntityKind::Application), 2000);
        assert_eq!(cfg.migration.page_size_for(EntityKind::District), 1000);
        assert_eq!(cfg.migration.retry_page_size(2000), 500);
        assert_eq!(cfg.migration.retry_page_size(3), 1);
        assert_eq!(cfg.quality.sample_size, 10);
        assert_eq!(cfg.config_paths, vec!["config"]);
        Ok(())
    }

    #[test]
    fn test_out_of_range_settings_rejected() -> anyhow::Result<()> {
        let cfg: ProjectConfig = serde_yaml::from_str(
            "name: kgv\nmigration:\n  error_tolerance: 1.5\n  max_concurrency: 0\n",
        )?;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_paths_resolve_against_project() {
        let cfg = ProjectConfig::new("kgv");
        let dir = Path::new("/srv/kgv");
        assert_eq!(
            cfg.database_location(dir),
            "/srv/kgv/target/allotment.duckdb"
        );
        assert_eq!(cfg.data_dir(dir), PathBuf::from("/srv/kgv/data"));

        let mut mem = ProjectConfig::new("kgv");
        mem.database = ":memory:".into();
        assert_eq!(mem.database_location(dir), ":memory:");
    }
}
