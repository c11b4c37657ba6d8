// allotment-core/src/infrastructure/config/project.rs

use serde::{Deserialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use validator::Validate;
use walkdir::WalkDir;

use crate::domain::entity::EntityKind;
use crate::domain::monitoring::AlertRuleDefinition;
use crate::domain::project::ProjectConfig;
use crate::domain::quality::RuleDefinition;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;

const CONFIG_CANDIDATES: [&str; 2] = ["allotment.yaml", "allotment.yml"];

// --- LOADER ---

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    // 1. Main file discovery
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project configuration");

    // 2. Base YAML
    let mut config: ProjectConfig = load_fragment(&config_path)?;

    // 3. Satellites (fail-secure: a corrupt satellite stops the load)
    if let Some(config_folder) = config.config_paths.first() {
        let config_dir = project_dir.join(config_folder);
        if config_dir.exists() {
            load_satellite_configs(&mut config, &config_dir)?;
        }
    }

    // 4. Environment layering
    apply_env_overrides(&mut config)?;

    // 5. Range checks
    config.validate()?;
    for key in config.migration.page_sizes.keys() {
        key.parse::<EntityKind>().map_err(|_| {
            InfrastructureError::ConfigError(format!(
                "migration.page_sizes: unknown entity '{}'",
                key
            ))
        })?;
    }

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "{} (checked: {:?})",
        root.display(),
        CONFIG_CANDIDATES
    )))
}

/// Loads a typed configuration fragment from a YAML file.
fn load_fragment<T: DeserializeOwned>(path: &Path) -> Result<T, InfrastructureError> {
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        InfrastructureError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
    })
}

#[derive(Deserialize)]
struct QualityWrapper {
    #[serde(default)]
    rules: Vec<RuleDefinition>,
}

#[derive(Deserialize)]
struct AlertsWrapper {
    #[serde(default)]
    alerts: Vec<AlertRuleDefinition>,
}

fn load_satellite_configs(
    config: &mut ProjectConfig,
    config_dir: &Path,
) -> Result<(), InfrastructureError> {
    // A. Quality rule registry
    let qual_path = config_dir.join("quality.yml");
    if qual_path.exists() {
        let wrapper: QualityWrapper = load_fragment(&qual_path)?;
        config.quality_rules.extend(wrapper.rules);
        info!("  ✅ Quality rules loaded");
    }

    // B. Additional rule files, one domain per file
    let rules_dir = config_dir.join("rules");
    if rules_dir.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(&rules_dir)
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        files.sort();
        for path in files {
            let wrapper: QualityWrapper = load_fragment(&path)?;
            info!(path = ?path, count = wrapper.rules.len(), "  ✅ Extra quality rules loaded");
            config.quality_rules.extend(wrapper.rules);
        }
    }

    // C. Alert rules
    let alert_path = config_dir.join("alerts.yml");
    if alert_path.exists() {
        let wrapper: AlertsWrapper = load_fragment(&alert_path)?;
        config.alert_rules = wrapper.alerts;
        info!("  🔔 Alert rules loaded");
    }

    let mut names: Vec<&str> = config.quality_rules.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
        return Err(InfrastructureError::ConfigError(format!(
            "quality rule '{}' is declared twice",
            dup[0]
        )));
    }

    Ok(())
}

fn apply_env_overrides(config: &mut ProjectConfig) -> Result<(), InfrastructureError> {
    if let Ok(val) = std::env::var("ALLOTMENT_DATABASE") {
        info!(old = ?config.database, new = ?val, "Overriding database via ENV");
        config.database = val;
    }
    if let Ok(val) = std::env::var("ALLOTMENT_TARGET_PATH") {
        info!(old = ?config.target_path, new = ?val, "Overriding target path via ENV");
        config.target_path = val;
    }
    if let Ok(val) = std::env::var("ALLOTMENT_PAGE_SIZE") {
        let size: usize = val.trim().parse().map_err(|_| {
            InfrastructureError::ConfigError(format!("ALLOTMENT_PAGE_SIZE '{}' is not a number", val))
        })?;
        info!(old = config.migration.default_page_size, new = size, "Overriding page size via ENV");
        config.migration.default_page_size = size;
        if !config.migration.page_sizes.is_empty() {
            warn!("ALLOTMENT_PAGE_SIZE clears per-entity page sizes");
            config.migration.page_sizes.clear();
        }
    }
    Ok(())
}

// --- SCAFFOLDING ---

const DEFAULT_QUALITY_YML: &str = r#"rules:
  - name: application_last_name_present
    table: applications
    column: last_name
    type: NOT_NULL
    severity: ERROR
    description: Every application names an applicant

  - name: orphaned_history_entries
    table: application_history
    column: application_id
    type: REFERENCE
    severity: ERROR
    params:
      ref_table: applications
      ref_column: id

  - name: invalid_postal_codes
    table: applications
    column: postal_code
    type: PATTERN
    severity: WARNING
    params:
      pattern: "^[0-9]{5}$"
"#;

const DEFAULT_ALERTS_YML: &str = r#"alerts:
  - name: store_unavailable
    metric_name: store_available
    operator: "<"
    threshold: 1
    severity: ERROR
    window_minutes: 15

  - name: quality_errors_present
    metric_name: quality_error_violations
    operator: ">"
    threshold: 0
    severity: WARNING
    window_minutes: 60
"#;

/// Writes a new project skeleton. Existing files are never overwritten.
#[instrument]
pub fn scaffold_project(project_dir: &Path, name: &str) -> Result<Vec<PathBuf>, InfrastructureError> {
    let config = ProjectConfig::new(name);
    let main = serde_yaml::to_string(&config)?;

    let files: [(PathBuf, &str); 3] = [
        (project_dir.join(CONFIG_CANDIDATES[0]), main.as_str()),
        (project_dir.join("config").join("quality.yml"), DEFAULT_QUALITY_YML),
        (project_dir.join("config").join("alerts.yml"), DEFAULT_ALERTS_YML),
    ];

    fs::create_dir_all(project_dir.join("config"))?;
    fs::create_dir_all(config.data_dir(project_dir))?;

    let mut written = Vec::new();
    for (path, content) in files {
        if path.exists() {
            warn!(path = ?path, "Skipping existing file");
            continue;
        }
        atomic_write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}
