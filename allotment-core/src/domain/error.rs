// allotment-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Circular dependency detected involving: {0}")]
    #[diagnostic(
        code(allotment::domain::cycle),
        help("Check the dependency declarations of the transformation units.")
    )]
    CircularDependency(String),

    #[error("Unknown entity '{0}'")]
    #[diagnostic(
        code(allotment::domain::unknown_entity),
        help("Known entities: districts, cadastral_districts, users, file_references, entry_numbers, applications, application_history, identifiers, field_mappings.")
    )]
    UnknownEntity(String),

    #[error("Batch {0} not found")]
    #[diagnostic(code(allotment::domain::batch_not_found))]
    BatchNotFound(i64),

    #[error("Quality rule '{0}' not found")]
    #[diagnostic(code(allotment::domain::rule_not_found))]
    RuleNotFound(String),

    #[error("Invalid quality rule '{name}': {reason}")]
    #[diagnostic(
        code(allotment::domain::invalid_rule),
        help("Check the rule declaration in quality.yml (type, table, column and params).")
    )]
    InvalidRule { name: String, reason: String },

    #[error("Invalid alert rule '{name}': {reason}")]
    #[diagnostic(
        code(allotment::domain::invalid_alert_rule),
        help("Check the rule declaration in alerts.yml.")
    )]
    InvalidAlertRule { name: String, reason: String },

    #[error("Unknown value '{value}' for {kind}")]
    #[diagnostic(code(allotment::domain::unknown_value))]
    UnknownValue { kind: &'static str, value: String },
}
