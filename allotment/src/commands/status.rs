// allotment/src/commands/status.rs
//
// USE CASE: Per-entity progress of a batch and the open alerts.

use std::path::PathBuf;
use std::sync::Arc;

use allotment_core::application::{AlertManager, MigrationOrchestrator};
use allotment_core::domain::migration::BatchKind;
use allotment_core::infrastructure::adapters::TracingAlertSink;

use super::project::{Project, opt, table};

pub async fn execute(project_dir: PathBuf, batch: Option<i64>, json: bool) -> anyhow::Result<()> {
    let project = Project::open(&project_dir).await?;
    let batch_id = project.resolve_batch(batch, BatchKind::Migration).await?;

    let orchestrator = MigrationOrchestrator::new(project.connector.clone(), project.config.migration.clone());
    let summary = orchestrator.summary(batch_id).await?;
    let alerts = AlertManager::new(project.connector.clone(), Arc::new(TracingAlertSink));
    let open = alerts.events(true, 50).await?;
    let recent = project.registry().list_batches(5).await?;

    if json {
        let doc = serde_json::json!({
            "batch_id": batch_id,
            "entities": summary,
            "open_alerts": open,
            "recent_batches": recent,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("📊 Batch {}", batch_id);
    let mut out = table(vec![
        "Entity", "Status", "Staged", "Processed", "Failed", "Done %", "ETA (s)", "Quality",
    ]);
    for p in &summary {
        out.add_row(vec![
            p.entity.as_str().to_string(),
            opt(p.status),
            p.staged.to_string(),
            p.processed.to_string(),
            p.failed.to_string(),
            format!("{:.1}", p.completion_pct),
            opt(p.eta_secs.map(|s| format!("{:.0}", s))),
            opt(p.quality_score.map(|q| format!("{:.3}", q))),
        ]);
    }
    println!("{out}");

    let others: Vec<String> = recent
        .iter()
        .filter(|b| b.id != batch_id)
        .map(|b| format!("#{} {} ({})", b.id, b.kind.as_str(), b.created_at.format("%Y-%m-%d %H:%M")))
        .collect();
    if !others.is_empty() {
        println!("   Other recent batches: {}", others.join(", "));
    }

    if open.is_empty() {
        println!("   ✅ No open alerts.");
    } else {
        println!("\n🚨 {} open alert(s):", open.len());
        for event in &open {
            println!(
                "   #{} {} (since {})",
                event.id,
                opt(event.message.as_deref()),
                event.triggered_at
            );
        }
    }
    Ok(())
}
