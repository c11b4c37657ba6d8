// allotment/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "allotment")]
#[command(about = "Legacy allotment database migration, data quality and monitoring", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🌱 Scaffolds a project (allotment.yaml, quality and alert rules) and bootstraps the store
    Init {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Project name written to allotment.yaml
        #[arg(long, default_value = "allotment")]
        name: String,
    },

    /// 📥 Stages the legacy CSV exports into a new migration batch
    Ingest {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Export directory (default: the project's data-path)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// 🚀 Transforms and loads a staged batch into the target tables
    Migrate {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Batch to migrate (default: latest migration batch)
        #[arg(long)]
        batch: Option<i64>,

        /// Only these entities, comma separated (ex: "districts,cadastral_districts")
        #[arg(long, short, value_delimiter = ',')]
        select: Vec<String>,
    },

    /// 📊 Shows per-entity progress of a batch and the open alerts
    Status {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        #[arg(long)]
        batch: Option<i64>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// 🧪 Evaluates the data-quality rules
    Quality {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Batch to attach the results to (default: a new validation batch)
        #[arg(long)]
        batch: Option<i64>,

        /// Only rules on this table
        #[arg(long)]
        table: Option<String>,

        /// Only rules of this severity (ERROR, WARNING, INFO)
        #[arg(long)]
        severity: Option<String>,

        /// Exit with error if any ERROR-severity rule has violations
        #[arg(long)]
        strict: bool,
    },

    /// 📈 Collects metrics and evaluates alert rules
    Monitor {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Seconds between cycles (default: monitoring.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// ✋ Acknowledges an open alert event
    Ack {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Alert event id
        event_id: i64,

        #[arg(long, env = "USER", default_value = "operator")]
        actor: String,
    },

    /// 🔍 Inspects a table of the project store (schema + sample rows)
    Inspect {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Table name to inspect
        #[arg(long, short)]
        table: String,

        /// Number of sample rows to display
        #[arg(long, default_value = "5")]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_migrate_defaults() -> Result<()> {
        let args = Cli::parse_from(["allotment", "migrate"]);
        match args.command {
            Commands::Migrate {
                project_dir,
                batch,
                select,
            } => {
                assert_eq!(project_dir.to_string_lossy(), ".");
                assert_eq!(batch, None);
                assert!(select.is_empty());
                Ok(())
            }
            _ => bail!("Expected Migrate command"),
        }
    }

    #[test]
    fn test_cli_parse_migrate_select() -> Result<()> {
        let args = Cli::parse_from([
            "allotment",
            "migrate",
            "--select",
            "districts,cadastral_districts",
            "--batch",
            "3",
            "--project-dir",
            "/tmp",
        ]);
        match args.command {
            Commands::Migrate {
                project_dir,
                batch,
                select,
            } => {
                assert_eq!(project_dir.to_string_lossy(), "/tmp");
                assert_eq!(batch, Some(3));
                assert_eq!(select, vec!["districts", "cadastral_districts"]);
                Ok(())
            }
            _ => bail!("Expected Migrate command"),
        }
    }

    #[test]
    fn test_cli_parse_quality_strict() -> Result<()> {
        let args = Cli::parse_from(["allotment", "quality", "--strict", "--severity", "ERROR"]);
        match args.command {
            Commands::Quality {
                strict, severity, ..
            } => {
                assert!(strict);
                assert_eq!(severity.as_deref(), Some("ERROR"));
                Ok(())
            }
            _ => bail!("Expected Quality command"),
        }
    }

    #[test]
    fn test_cli_parse_ack() -> Result<()> {
        let args = Cli::parse_from(["allotment", "ack", "12", "--actor", "gartenamt"]);
        match args.command {
            Commands::Ack {
                event_id, actor, ..
            } => {
                assert_eq!(event_id, 12);
                assert_eq!(actor, "gartenamt");
                Ok(())
            }
            _ => bail!("Expected Ack command"),
        }
    }

    #[test]
    fn test_cli_parse_inspect() -> Result<()> {
        let args = Cli::parse_from(["allotment", "inspect", "--table", "users", "--limit", "10"]);
        match args.command {
            Commands::Inspect { table, limit, .. } => {
                assert_eq!(table, "users");
                assert_eq!(limit, 10);
                Ok(())
            }
            _ => bail!("Expected Inspect command"),
        }
    }
}
