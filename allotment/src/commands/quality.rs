// allotment/src/commands/quality.rs
//
// USE CASE: Evaluate the data-quality rule registry.

use std::path::PathBuf;

use allotment_core::application::QualityEngine;
use allotment_core::domain::Severity;
use allotment_core::domain::migration::BatchKind;
use anyhow::Context;

use super::project::{Project, opt, table};

pub async fn execute(
    project_dir: PathBuf,
    batch: Option<i64>,
    table_filter: Option<String>,
    severity: Option<String>,
    strict: bool,
) -> anyhow::Result<()> {
    let project = Project::open(&project_dir).await?;
    let severity: Option<Severity> = severity
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("Invalid --severity")?;

    let batch_id = match batch {
        Some(id) => project.registry().get_batch(id).await?.id,
        None => {
            project
                .registry()
                .create_batch(BatchKind::Validation, Some("allotment quality"))
                .await?
                .id
        }
    };

    let engine = QualityEngine::new(project.connector.clone(), project.config.quality.sample_size);
    let registered = engine
        .register_rules(&project.config.quality_rules)
        .await
        .context("Quality rule registration failed")?;
    println!("🧪 Evaluating {} rule(s) for batch {}...", registered.len(), batch_id);

    let results = engine
        .evaluate_all(batch_id, table_filter.as_deref(), severity)
        .await?;

    let mut out = table(vec!["Rule", "Table", "Severity", "Status", "Violations", "ms"]);
    for r in &results {
        out.add_row(vec![
            r.rule_name.clone(),
            r.table.clone(),
            r.severity.to_string(),
            r.status.to_string(),
            r.violation_count.to_string(),
            r.execution_ms.to_string(),
        ]);
    }
    println!("{out}");

    for r in results.iter().filter(|r| r.message.is_some()) {
        eprintln!("   ⚠️  {}: {}", r.rule_name, opt(r.message.as_deref()));
    }

    let report = engine.generate_report(batch_id).await?;
    println!("📋 Summary:");
    for s in &report.by_severity {
        println!(
            "   {:<8} {} run, {} violated, {} violations, worst: {}",
            s.severity.as_str(),
            s.rules_run,
            s.rules_violated,
            s.total_violations,
            opt(s.worst_rule.as_deref())
        );
    }

    let blocking: u64 = results
        .iter()
        .filter(|r| r.severity == Severity::Error)
        .map(|r| r.violation_count)
        .sum();
    if blocking > 0 {
        eprintln!("\n⚠️  {} ERROR-severity violation(s) detected.", blocking);
        if strict {
            eprintln!("💥 --strict mode: Failing due to quality violations.");
            std::process::exit(1);
        }
    } else {
        println!("   ✅ No ERROR-severity violations.");
    }
    Ok(())
}
