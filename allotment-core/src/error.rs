// allotment-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllotmentError {
    // --- DOMAIN ERRORS (rules, configuration, references) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (store, IO, parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- GENERIC / APPLICATION ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

// Manual implementations keep `?` ergonomic on IO and DuckDB calls
impl From<std::io::Error> for AllotmentError {
    fn from(err: std::io::Error) -> Self {
        AllotmentError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for AllotmentError {
    fn from(err: duckdb::Error) -> Self {
        AllotmentError::Infrastructure(InfrastructureError::Database(DatabaseError::DuckDB(err)))
    }
}

impl From<serde_json::Error> for AllotmentError {
    fn from(err: serde_json::Error) -> Self {
        AllotmentError::Infrastructure(InfrastructureError::Json(err))
    }
}
