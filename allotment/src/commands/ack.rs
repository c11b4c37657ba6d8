// allotment/src/commands/ack.rs
//
// USE CASE: Acknowledge an open alert.

use std::path::PathBuf;
use std::sync::Arc;

use allotment_core::application::AlertManager;
use allotment_core::domain::monitoring::AckOutcome;
use allotment_core::infrastructure::adapters::TracingAlertSink;

use super::project::Project;

pub async fn execute(project_dir: PathBuf, event_id: i64, actor: String) -> anyhow::Result<()> {
    let project = Project::open(&project_dir).await?;
    let alerts = AlertManager::new(project.connector.clone(), Arc::new(TracingAlertSink));

    match alerts.acknowledge(event_id, &actor).await? {
        AckOutcome::Acknowledged => {
            println!("✋ Alert #{} acknowledged by {}", event_id, actor);
            Ok(())
        }
        AckOutcome::NotFound => {
            eprintln!("❌ No open alert with id {}", event_id);
            std::process::exit(1);
        }
    }
}
