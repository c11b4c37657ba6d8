// allotment-core/src/application/transform/applications.rs

use async_trait::async_trait;

use crate::application::transform::lookup;
use crate::application::transform::{
    RowResult, TransformUnit, UnitContext, Upsert, required_id, required_text, text,
};
use crate::domain::conversion::Converter;
use crate::domain::entity::EntityKind;
use crate::domain::migration::SkipReason;
use crate::error::AllotmentError;
use crate::ports::connector::Row;

const ID_KEY: &[&str] = &["id"];

/// Allotment applications. Person, contact and waiting-list data; every
/// non-key field is optional and a bad value only nulls that field.
pub struct ApplicationUnit;

#[async_trait]
impl TransformUnit for ApplicationUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::Application
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        _ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "application_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };
        let last_name = match required_text(row, "last_name", conv) {
            Ok(name) => name,
            Err(reason) => return Ok(Err(reason)),
        };

        let raw = |c: &str| row.text(c);
        let mut upsert = Upsert::new("applications", ID_KEY)
            .text("id", Some(id))
            .text("last_name", Some(last_name));

        for column in [
            "file_reference",
            "waiting_list_32",
            "waiting_list_33",
            "salutation",
            "title",
            "first_name",
            "salutation_2",
            "first_name_2",
            "last_name_2",
            "letter_salutation",
            "street",
            "city",
            "preferences",
            "remarks",
        ] {
            upsert = upsert.text(column, text(row, column, conv));
        }

        for column in ["phone", "mobile_phone", "business_phone"] {
            upsert = upsert.text(column, conv.validate_phone(column, raw(column).as_deref()));
        }

        for column in [
            "birth_date",
            "birth_date_2",
            "application_date",
            "confirmation_date",
            "current_offer_date",
            "deletion_date",
        ] {
            upsert = upsert.date(column, conv.to_date(column, raw(column).as_deref()));
        }

        Ok(Ok(upsert
            .text("email", conv.validate_email("email", raw("email").as_deref()))
            .text(
                "postal_code",
                conv.validate_postal_code("postal_code", raw("postal_code").as_deref()),
            )
            .timestamp(
                "deactivated_at",
                conv.to_timestamp("deactivated_at", raw("deactivated_at").as_deref()),
            )
            .bool("active", conv.to_boolean("active", raw("active").as_deref()))))
    }
}

/// Application history. Each entry must attach to a loaded application.
pub struct HistoryUnit;

impl HistoryUnit {
    /// The application id when it is loaded, otherwise the application
    /// carrying the same file reference.
    async fn resolve_application(
        row: &Row,
        conv: &mut Converter,
        ctx: &UnitContext,
    ) -> Result<Result<String, SkipReason>, AllotmentError> {
        let raw_ref = row.text("application_ref");
        if let Some(candidate) = conv.to_identifier("application_ref", raw_ref.as_deref())
            && lookup::exists(ctx, "applications", &candidate).await?
        {
            return Ok(Ok(candidate));
        }

        let file_reference = text(row, "file_reference", conv);
        if let Some(fr) = file_reference.as_deref()
            && let Some(application) = lookup::application_by_file_reference(ctx, fr).await?
        {
            return Ok(Ok(application));
        }

        let reason = match (raw_ref, file_reference) {
            (None, None) => SkipReason::MissingRequired {
                field: "application_ref",
            },
            (raw_ref, file_reference) => SkipReason::UnresolvedReference {
                field: "application_ref",
                value: raw_ref.or(file_reference).unwrap_or_default(),
            },
        };
        Ok(Err(reason))
    }
}

#[async_trait]
impl TransformUnit for HistoryUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::ApplicationHistory
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "history_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };
        let application_id = match Self::resolve_application(row, conv, ctx).await? {
            Ok(a) => a,
            Err(reason) => return Ok(Err(reason)),
        };

        let mut upsert = Upsert::new("application_history", ID_KEY)
            .text("id", Some(id))
            .text("application_id", Some(application_id))
            .timestamp(
                "action_date",
                conv.to_timestamp("action_date", row.text("action_date").as_deref()),
            );
        for column in [
            "file_reference",
            "action_type",
            "cadastral_area",
            "plot_section",
            "parcel",
            "size_info",
            "case_worker",
            "note",
            "comment",
        ] {
            upsert = upsert.text(column, text(row, column, conv));
        }
        Ok(Ok(upsert))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::staging::StagingStore;
    use crate::application::store::now;
    use crate::application::transform::run_pages;
    use crate::application::transform::testing::{entity, stage, store};
    use crate::ports::connector::{Connector, SqlValue};
    use anyhow::Result;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn column_index(name: &str) -> usize {
        EntityKind::Application
            .staging_columns()
            .iter()
            .position(|c| *c == name)
            .unwrap()
    }

    /// A staged application row with only the given cells filled.
    fn application<'a>(cells: &[(&str, &'a str)]) -> Vec<&'a str> {
        let mut row = vec![""; EntityKind::Application.staging_columns().len()];
        for (name, value) in cells {
            row[column_index(name)] = value;
        }
        row
    }

    async fn load(
        db: &Arc<dyn Connector>,
        unit: &dyn TransformUnit,
        batch_id: i64,
    ) -> Result<crate::application::transform::UnitRun> {
        let ctx = UnitContext { connector: db.clone(), batch_id, now: now() };
        Ok(run_pages(unit, &ctx, &StagingStore::new(db.clone()), 100, &CancellationToken::new()).await?)
    }

    #[tokio::test]
    async fn test_implausible_birth_date_nulls_field_only() -> Result<()> {
        let db = store().await?;
        let row = application(&[
            ("application_id", "A-1"),
            ("last_name", "Schmidt"),
            ("birth_date", "01.01.1700"),
            ("application_date", "15.03.2018"),
        ]);
        stage(&db, entity(EntityKind::Application), 1, &[&row]).await?;

        let run = load(&db, &ApplicationUnit, 1).await?;
        assert_eq!(run.counters.succeeded, 1);
        assert_eq!(run.counters.field_issues, 1);

        let rows = db
            .query(
                "SELECT CAST(birth_date AS VARCHAR) AS birth, CAST(application_date AS VARCHAR) AS applied FROM applications WHERE id = 'a-1'",
                &[],
            )
            .await?;
        assert_eq!(rows[0].text("birth"), None);
        assert_eq!(rows[0].text("applied").as_deref(), Some("2018-03-15"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_preserves_values_and_is_idempotent() -> Result<()> {
        let db = store().await?;
        let full = application(&[
            ("application_id", "A-2"),
            ("last_name", "Weber"),
            ("email", "weber@example.de"),
            ("postal_code", "04109"),
        ]);
        stage(&db, entity(EntityKind::Application), 1, &[&full]).await?;
        load(&db, &ApplicationUnit, 1).await?;
        let again = load(&db, &ApplicationUnit, 1).await?;
        assert_eq!(again.counters.succeeded, 1);

        // A later export lost the email and has a new street
        let partial = application(&[
            ("application_id", "A-2"),
            ("last_name", "Weber"),
            ("street", "Gartenweg 3"),
        ]);
        stage(&db, entity(EntityKind::Application), 2, &[&partial]).await?;
        load(&db, &ApplicationUnit, 2).await?;

        let rows = db
            .query("SELECT email, street, postal_code FROM applications", &[])
            .await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("email").as_deref(), Some("weber@example.de"));
        assert_eq!(rows[0].text("street").as_deref(), Some("Gartenweg 3"));
        assert_eq!(rows[0].text("postal_code").as_deref(), Some("04109"));
        Ok(())
    }

    #[tokio::test]
    async fn test_history_resolution_and_orphans() -> Result<()> {
        let db = store().await?;
        let app = application(&[
            ("application_id", "A-3"),
            ("last_name", "Krause"),
            ("file_reference", "KGV-12/2019"),
        ]);
        stage(&db, entity(EntityKind::Application), 1, &[&app]).await?;
        load(&db, &ApplicationUnit, 1).await?;

        stage(
            &db,
            entity(EntityKind::ApplicationHistory),
            1,
            &[
                &["h1", "A-3", "", "Angebot", "2019-05-02 10:00:00", "", "", "", "", "", "", ""],
                &["h2", "", "KGV-12/2019", "Vertrag", "", "", "", "", "", "", "", ""],
                &["h3", "A-404", "", "Angebot", "", "", "", "", "", "", "", ""],
                &["h4", "", "", "Notiz", "", "", "", "", "", "", "", ""],
            ],
        )
        .await?;
        let run = load(&db, &HistoryUnit, 1).await?;

        assert_eq!(run.counters.processed, 4);
        assert_eq!(run.counters.succeeded, 2);
        assert_eq!(run.counters.failed, 2);
        assert!(run.rejections.iter().any(|r| r.starts_with("h3:") && r.contains("does not resolve")));
        assert!(run.rejections.iter().any(|r| r.starts_with("h4:") && r.contains("missing")));

        let attached = db
            .query_scalar("SELECT count(*) FROM application_history WHERE application_id = 'a-3'", &[])
            .await?;
        assert_eq!(attached, Some(SqlValue::Int(2)));
        Ok(())
    }
}
