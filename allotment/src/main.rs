// allotment/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=allotment_core=debug allotment migrate ... for the details
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { project_dir, name } => commands::init::execute(project_dir, name).await,
        Commands::Ingest {
            project_dir,
            data_dir,
        } => commands::ingest::execute(project_dir, data_dir).await,
        Commands::Migrate {
            project_dir,
            batch,
            select,
        } => commands::migrate::execute(project_dir, batch, select).await,
        Commands::Status {
            project_dir,
            batch,
            json,
        } => commands::status::execute(project_dir, batch, json).await,
        Commands::Quality {
            project_dir,
            batch,
            table,
            severity,
            strict,
        } => commands::quality::execute(project_dir, batch, table, severity, strict).await,
        Commands::Monitor {
            project_dir,
            once,
            interval,
        } => commands::monitor::execute(project_dir, once, interval).await,
        Commands::Ack {
            project_dir,
            event_id,
            actor,
        } => commands::ack::execute(project_dir, event_id, actor).await,
        Commands::Inspect {
            project_dir,
            table,
            limit,
        } => commands::inspect::execute(project_dir, table, limit),
    }
}
