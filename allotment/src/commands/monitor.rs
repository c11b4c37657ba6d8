// allotment/src/commands/monitor.rs
//
// USE CASE: Metric collection and alert evaluation, once or on an interval.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use allotment_core::application::{CycleReport, MonitoringService};
use allotment_core::infrastructure::adapters::TracingAlertSink;
use anyhow::Context;
use tokio_util::sync::CancellationToken;

use super::project::Project;

fn print_cycle(report: &CycleReport) {
    println!(
        "📈 {}: {} metrics, {} rules evaluated, {} triggered, {} resolved",
        report.collected_at.format("%Y-%m-%d %H:%M:%S"),
        report.metrics_collected,
        report.alerts_evaluated,
        report.triggered,
        report.resolved
    );
    if report.failed_rules > 0 {
        eprintln!("   ⚠️  {} alert rule(s) could not be evaluated", report.failed_rules);
    }
}

pub async fn execute(project_dir: PathBuf, once: bool, interval: Option<u64>) -> anyhow::Result<()> {
    let project = Project::open(&project_dir).await?;
    let service = MonitoringService::new(
        project.connector.clone(),
        Arc::new(TracingAlertSink),
        &project.config.monitoring,
    );
    service
        .alerts()
        .register_rules(&project.config.alert_rules)
        .await
        .context("Alert rule registration failed")?;

    if once {
        let report = service.run_cycle().await?;
        print_cycle(&report);
        // Let spawned notifications flush before the runtime shuts down
        tokio::task::yield_now().await;
        return Ok(());
    }

    let every = Duration::from_secs(interval.unwrap_or(project.config.monitoring.interval_secs).max(1));
    println!("👀 Monitoring every {:?}. Press Ctrl-C to stop.", every);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let cycles = service.run_loop(every, cancel).await;
    println!("\n🛑 Monitoring stopped after {} cycle(s).", cycles);
    Ok(())
}
