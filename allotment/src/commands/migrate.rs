// allotment/src/commands/migrate.rs
//
// USE CASE: Transform and load a staged batch.

use std::path::PathBuf;

use allotment_core::application::{MigrationOrchestrator, write_migration_report};
use allotment_core::domain::EntityKind;
use allotment_core::domain::migration::{BatchKind, RunStatus};
use anyhow::Context;
use tokio_util::sync::CancellationToken;

use super::project::{Project, opt, table};

pub async fn execute(
    project_dir: PathBuf,
    batch: Option<i64>,
    select: Vec<String>,
) -> anyhow::Result<()> {
    let project = Project::open(&project_dir).await?;
    let batch_id = project.resolve_batch(batch, BatchKind::Migration).await?;

    let selection: Vec<EntityKind> = select
        .iter()
        .map(|s| s.parse::<EntityKind>())
        .collect::<Result<_, _>>()
        .context("Invalid --select")?;

    // Ctrl-C: no new page or unit starts, in-flight pages finish
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Cancellation requested, finishing in-flight pages...");
            on_signal.cancel();
        }
    });

    println!("🚀 Migrating batch {}...", batch_id);
    let orchestrator = MigrationOrchestrator::new(project.connector.clone(), project.config.migration.clone())
        .with_cancellation(cancel);
    let run = orchestrator
        .run_migration(batch_id, (!selection.is_empty()).then_some(selection.as_slice()))
        .await?;

    let mut out = table(vec![
        "Entity", "Status", "Processed", "Succeeded", "Failed", "Field issues", "Rows/min", "Retried",
    ]);
    for o in &run.outcomes {
        out.add_row(vec![
            o.entity.as_str().to_string(),
            o.status.to_string(),
            o.counters.processed.to_string(),
            o.counters.succeeded.to_string(),
            o.counters.failed.to_string(),
            o.counters.field_issues.to_string(),
            format!("{:.0}", o.throughput_per_minute()),
            if o.retried { "yes".into() } else { "-".into() },
        ]);
    }
    println!("{out}");

    for o in run.outcomes.iter().filter(|o| o.message.is_some()) {
        eprintln!("   ⚠️  {}: {}", o.entity, opt(o.message.as_deref()));
    }
    if !run.skipped.is_empty() {
        eprintln!("   🛑 Not started: {:?}", run.skipped);
    }
    for (check, count) in run.validation.integrity_checks.iter().filter(|(_, n)| **n > 0) {
        eprintln!("   🔗 Integrity: {} = {}", check, count);
    }

    let report = write_migration_report(&project.config.target_dir(&project.dir), &run)
        .context("Failed to write the migration report")?;
    println!("📄 Report saved to {}", report.display());

    match run.status {
        RunStatus::Error => {
            eprintln!("\n❌ FAILURE. Batch {} finished with errors.", batch_id);
            std::process::exit(1);
        }
        RunStatus::Warning => {
            println!("\n⚠️  Batch {} migrated with warnings in {} ms.", batch_id, run.duration_ms);
        }
        _ => println!("\n✨ SUCCESS! Batch {} migrated in {} ms.", batch_id, run.duration_ms),
    }
    Ok(())
}
