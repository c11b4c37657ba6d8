// allotment-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB error: {0}")]
    #[diagnostic(
        code(allotment::infra::database::duckdb),
        help("The migration store rejected a statement; run with RUST_LOG=debug to see it.")
    )]
    DuckDB(#[from] duckdb::Error),

    #[error("Store lock poisoned")]
    #[diagnostic(code(allotment::infra::database::poisoned))]
    Poisoned,
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- STORE ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    // --- FILES ---
    #[error("I/O error: {0}")]
    #[diagnostic(
        code(allotment::infra::io),
        help("Check the export directory, the target path and their permissions.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML error: {0}")]
    #[diagnostic(
        code(allotment::infra::yaml),
        help("Check allotment.yaml, quality.yml and alerts.yml.")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(allotment::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(allotment::infra::config))]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(allotment::infra::config_invalid),
        help("A setting is out of its allowed range.")
    )]
    Validation(#[from] validator::ValidationErrors),

    #[error("No allotment.yaml found in {0}")]
    #[diagnostic(
        code(allotment::infra::config_missing),
        help("Run `allotment init` to scaffold a project.")
    )]
    ConfigNotFound(String),
}

// `?` on raw duckdb calls inside the adapter
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDB(err))
    }
}
