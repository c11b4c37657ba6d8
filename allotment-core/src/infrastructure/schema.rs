// allotment-core/src/infrastructure/schema.rs

//! DDL bootstrap. The operational history lives beside the migrated data,
//! so one database holds staging, target and operational tables.
//!
//! Target tables carry no foreign keys: references are resolved and
//! enforced by the transform units at load time.

use tracing::{debug, instrument};

use crate::domain::entity::{DISTRICT_LINK_COLUMNS, DISTRICT_LINK_STAGING_TABLE, EntityKind};
use crate::domain::quality::rule::quote_ident;
use crate::error::AllotmentError;
use crate::ports::connector::Connector;

const OPERATIONAL_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_batches START 1;
CREATE TABLE IF NOT EXISTS batches (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_batches'),
    kind VARCHAR NOT NULL,
    source VARCHAR,
    created_at TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS seq_run_log START 1;
CREATE TABLE IF NOT EXISTS run_log (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_run_log'),
    batch_id BIGINT NOT NULL,
    entity VARCHAR NOT NULL,
    operation VARCHAR NOT NULL,
    status VARCHAR NOT NULL,
    message VARCHAR,
    processed BIGINT NOT NULL DEFAULT 0,
    succeeded BIGINT NOT NULL DEFAULT 0,
    failed BIGINT NOT NULL DEFAULT 0,
    warnings BIGINT NOT NULL DEFAULT 0,
    started_at TIMESTAMP NOT NULL,
    completed_at TIMESTAMP,
    duration_ms BIGINT,
    UNIQUE (batch_id, entity, operation)
);

CREATE SEQUENCE IF NOT EXISTS seq_quality_rules START 1;
CREATE TABLE IF NOT EXISTS quality_rules (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_quality_rules'),
    name VARCHAR NOT NULL UNIQUE,
    table_name VARCHAR NOT NULL,
    column_name VARCHAR,
    rule_type VARCHAR NOT NULL,
    predicate VARCHAR NOT NULL,
    severity VARCHAR NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    description VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS seq_quality_check_results START 1;
CREATE TABLE IF NOT EXISTS quality_check_results (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_quality_check_results'),
    batch_id BIGINT NOT NULL,
    rule_id BIGINT NOT NULL,
    violation_count BIGINT NOT NULL,
    sample_violations VARCHAR,
    execution_ms BIGINT NOT NULL,
    status VARCHAR NOT NULL,
    message VARCHAR,
    checked_at TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS seq_metrics START 1;
CREATE TABLE IF NOT EXISTS metrics (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_metrics'),
    name VARCHAR NOT NULL,
    category VARCHAR NOT NULL,
    value DOUBLE NOT NULL,
    unit VARCHAR,
    tags VARCHAR,
    recorded_at TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS seq_alert_rules START 1;
CREATE TABLE IF NOT EXISTS alert_rules (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_alert_rules'),
    name VARCHAR NOT NULL UNIQUE,
    metric_name VARCHAR NOT NULL,
    operator VARCHAR NOT NULL,
    threshold DOUBLE NOT NULL,
    severity VARCHAR NOT NULL,
    window_minutes BIGINT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    description VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS seq_alert_events START 1;
CREATE TABLE IF NOT EXISTS alert_events (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_alert_events'),
    rule_id BIGINT NOT NULL,
    state VARCHAR NOT NULL,
    value DOUBLE NOT NULL,
    threshold DOUBLE NOT NULL,
    message VARCHAR,
    triggered_at TIMESTAMP NOT NULL,
    resolved_at TIMESTAMP,
    acknowledged_at TIMESTAMP,
    acknowledged_by VARCHAR
);
"#;

const TARGET_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS districts (
    id VARCHAR PRIMARY KEY,
    name VARCHAR NOT NULL,
    active BOOLEAN,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS cadastral_districts (
    id VARCHAR PRIMARY KEY,
    district_id VARCHAR NOT NULL,
    code VARCHAR,
    name VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id VARCHAR PRIMARY KEY,
    salutation VARCHAR,
    first_name VARCHAR,
    last_name VARCHAR NOT NULL,
    employee_number VARCHAR,
    department VARCHAR,
    room VARCHAR,
    phone VARCHAR,
    fax VARCHAR,
    email VARCHAR,
    signature_code VARCHAR,
    job_title VARCHAR,
    is_admin BOOLEAN,
    can_administrate BOOLEAN,
    active BOOLEAN,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS file_references (
    id VARCHAR,
    district_code VARCHAR NOT NULL,
    number BIGINT NOT NULL,
    year BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    PRIMARY KEY (district_code, number, year)
);

CREATE TABLE IF NOT EXISTS entry_numbers (
    id VARCHAR,
    district_code VARCHAR NOT NULL,
    number BIGINT NOT NULL,
    year BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    PRIMARY KEY (district_code, number, year)
);

CREATE TABLE IF NOT EXISTS applications (
    id VARCHAR PRIMARY KEY,
    file_reference VARCHAR,
    waiting_list_32 VARCHAR,
    waiting_list_33 VARCHAR,
    salutation VARCHAR,
    title VARCHAR,
    first_name VARCHAR,
    last_name VARCHAR NOT NULL,
    birth_date DATE,
    salutation_2 VARCHAR,
    first_name_2 VARCHAR,
    last_name_2 VARCHAR,
    birth_date_2 DATE,
    letter_salutation VARCHAR,
    street VARCHAR,
    postal_code VARCHAR,
    city VARCHAR,
    phone VARCHAR,
    mobile_phone VARCHAR,
    business_phone VARCHAR,
    email VARCHAR,
    application_date DATE,
    confirmation_date DATE,
    current_offer_date DATE,
    deletion_date DATE,
    deactivated_at TIMESTAMP,
    preferences VARCHAR,
    remarks VARCHAR,
    active BOOLEAN,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS application_history (
    id VARCHAR PRIMARY KEY,
    application_id VARCHAR NOT NULL,
    file_reference VARCHAR,
    action_type VARCHAR,
    action_date TIMESTAMP,
    cadastral_area VARCHAR,
    plot_section VARCHAR,
    parcel VARCHAR,
    size_info VARCHAR,
    case_worker VARCHAR,
    note VARCHAR,
    comment VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS identifiers (
    id VARCHAR PRIMARY KEY,
    user_id VARCHAR,
    name VARCHAR,
    domain VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS field_mappings (
    id VARCHAR PRIMARY KEY,
    database_field VARCHAR,
    document_field VARCHAR,
    comment VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
"#;

/// Staging tables keep every legacy column as text.
pub fn staging_ddl(table: &str, columns: &[&str]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("    {} VARCHAR", quote_ident(c)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    row_num BIGINT NOT NULL,\n    batch_id BIGINT NOT NULL,\n{},\n    ingested_at TIMESTAMP NOT NULL\n);",
        quote_ident(table),
        cols.join(",\n")
    )
}

/// Creates every table and sequence that does not exist yet.
#[instrument(skip(connector))]
pub async fn bootstrap(connector: &dyn Connector) -> Result<(), AllotmentError> {
    connector.execute(OPERATIONAL_DDL).await?;
    connector.execute(TARGET_DDL).await?;

    for entity in EntityKind::ALL {
        let ddl = staging_ddl(entity.staging_table(), entity.staging_columns());
        connector.execute(&ddl).await?;
    }
    connector
        .execute(&staging_ddl(DISTRICT_LINK_STAGING_TABLE, DISTRICT_LINK_COLUMNS))
        .await?;

    debug!(engine = connector.engine_name(), "Schema bootstrapped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::DuckDBConnector;
    use anyhow::Result;

    #[tokio::test]
    async fn test_bootstrap_is_repeatable() -> Result<()> {
        let db = DuckDBConnector::in_memory()?;
        bootstrap(&db).await?;
        bootstrap(&db).await?;

        for entity in EntityKind::ALL {
            let cols = db.fetch_columns(entity.staging_table()).await?;
            assert_eq!(cols.len(), entity.staging_columns().len() + 3);
            assert!(!db.fetch_columns(entity.target_table()).await?.is_empty());
        }
        assert_eq!(db.fetch_columns(DISTRICT_LINK_STAGING_TABLE).await?.len(), 5);
        Ok(())
    }
}
