// allotment-core/src/application/validation.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::entity::EntityKind;
use crate::error::AllotmentError;
use crate::ports::connector::Connector;

const INTEGRITY_CHECKS: &[(&str, &str)] = &[
    (
        "orphaned_cadastral_districts",
        "SELECT count(*) FROM cadastral_districts cd \
         LEFT JOIN districts d ON cd.district_id = d.id WHERE d.id IS NULL",
    ),
    (
        "orphaned_application_history",
        "SELECT count(*) FROM application_history ah \
         LEFT JOIN applications a ON ah.application_id = a.id WHERE a.id IS NULL",
    ),
    (
        "identifiers_without_user",
        "SELECT count(*) FROM identifiers i \
         LEFT JOIN users u ON i.user_id = u.id WHERE i.user_id IS NOT NULL AND u.id IS NULL",
    ),
];

const QUALITY_CHECKS: &[(&str, &str)] = &[
    (
        "invalid_emails",
        "SELECT count(*) FROM applications WHERE email IS NOT NULL \
         AND NOT regexp_full_match(email, '[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\\.[A-Za-z]{2,}')",
    ),
    (
        "invalid_postal_codes",
        "SELECT count(*) FROM applications WHERE postal_code IS NOT NULL \
         AND NOT regexp_full_match(postal_code, '[0-9]{5}')",
    ),
];

/// Snapshot of the target tables taken after a migration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationValidation {
    pub record_counts: BTreeMap<String, i64>,
    pub integrity_checks: BTreeMap<String, i64>,
    pub quality_checks: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationValidation {
    /// Counts every target table and runs the fixed integrity and quality
    /// checks. A failing query is recorded in `error`, never raised.
    pub async fn collect(connector: &Arc<dyn Connector>) -> Self {
        let mut validation = Self::default();
        if let Err(e) = validation.fill(connector.as_ref()).await {
            warn!("Post-migration validation failed: {}", e);
            validation.error = Some(e.to_string());
        }
        validation
    }

    pub fn integrity_violations(&self) -> i64 {
        self.integrity_checks.values().sum()
    }

    async fn fill(&mut self, connector: &dyn Connector) -> Result<(), AllotmentError> {
        for entity in EntityKind::ALL {
            let table = entity.target_table();
            let sql = format!("SELECT count(*) FROM {}", table);
            self.record_counts
                .insert(table.to_string(), count(connector, &sql).await?);
        }
        for (name, sql) in INTEGRITY_CHECKS {
            self.integrity_checks
                .insert((*name).to_string(), count(connector, sql).await?);
        }
        for (name, sql) in QUALITY_CHECKS {
            self.quality_checks
                .insert((*name).to_string(), count(connector, sql).await?);
        }
        info!(
            integrity_violations = self.integrity_violations(),
            "Post-migration validation done"
        );
        Ok(())
    }
}

async fn count(connector: &dyn Connector, sql: &str) -> Result<i64, AllotmentError> {
    Ok(connector
        .query_scalar(sql, &[])
        .await?
        .and_then(|v| v.as_i64())
        .unwrap_or(0))
}
