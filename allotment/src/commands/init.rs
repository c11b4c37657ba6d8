// allotment/src/commands/init.rs
//
// USE CASE: Scaffold a project and bootstrap its store.

use std::path::PathBuf;
use std::sync::Arc;

use allotment_core::application::{AlertManager, QualityEngine};
use allotment_core::infrastructure::adapters::TracingAlertSink;
use allotment_core::infrastructure::config::scaffold_project;
use anyhow::Context;

use super::project::Project;

pub async fn execute(project_dir: PathBuf, name: String) -> anyhow::Result<()> {
    println!("🌱 Initializing project '{}' in {}", name, project_dir.display());

    let written = scaffold_project(&project_dir, &name)
        .with_context(|| format!("Failed to scaffold {:?}", project_dir))?;
    for path in &written {
        println!("   📝 {}", path.display());
    }
    if written.is_empty() {
        println!("   Nothing written, project files already exist.");
    }

    let project = Project::open(&project_dir).await?;
    let quality = QualityEngine::new(project.connector.clone(), project.config.quality.sample_size);
    let rules = quality.register_rules(&project.config.quality_rules).await?;
    let alerts = AlertManager::new(project.connector.clone(), Arc::new(TracingAlertSink));
    let alert_rules = alerts.register_rules(&project.config.alert_rules).await?;

    println!(
        "✨ Store ready at {} ({} quality rules, {} alert rules)",
        project.config.database_location(&project.dir),
        rules.len(),
        alert_rules.len()
    );
    Ok(())
}
