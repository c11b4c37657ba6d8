// allotment/src/commands/ingest.rs
//
// USE CASE: Stage the legacy CSV exports into a new batch.

use std::path::PathBuf;

use allotment_core::application::ingest_directory;

use super::project::{Project, table};

pub async fn execute(project_dir: PathBuf, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let project = Project::open(&project_dir).await?;
    let data_dir = data_dir.unwrap_or_else(|| project.config.data_dir(&project.dir));
    if !data_dir.is_dir() {
        anyhow::bail!("❌ Export directory not found: {}", data_dir.display());
    }

    println!("📥 Staging exports from {}...", data_dir.display());
    let summary = ingest_directory(project.connector.clone(), &data_dir).await?;

    let mut out = table(vec!["Staging table", "Rows"]);
    for (name, rows) in &summary.tables {
        out.add_row(vec![name.clone(), rows.to_string()]);
    }
    println!("{out}");

    if !summary.failures.is_empty() {
        eprintln!("\n⚠️  {} export(s) could not be staged:", summary.failures.len());
        for (name, reason) in &summary.failures {
            eprintln!("   ❌ {}: {}", name, reason);
        }
        std::process::exit(1);
    }

    println!(
        "✨ Batch {} staged ({} rows). Next: allotment migrate --batch {}",
        summary.batch_id,
        summary.total_rows(),
        summary.batch_id
    );
    Ok(())
}
