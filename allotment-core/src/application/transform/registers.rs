// allotment-core/src/application/transform/registers.rs

use async_trait::async_trait;

use crate::application::transform::{
    RowResult, TransformUnit, UnitContext, Upsert, required_text,
};
use crate::domain::conversion::Converter;
use crate::domain::entity::EntityKind;
use crate::domain::migration::SkipReason;
use crate::error::AllotmentError;
use crate::ports::connector::Row;

/// Natural key of both register tables.
const REGISTER_KEY: &[&str] = &["district_code", "number", "year"];

/// File references and entry numbers: `(district_code, number, year)`
/// triples keyed on the triple itself. Legacy duplicates of a triple merge
/// into one row.
pub struct RegisterNumberUnit {
    entity: EntityKind,
}

impl RegisterNumberUnit {
    pub fn new(entity: EntityKind) -> Self {
        Self { entity }
    }
}

fn required_number(
    row: &Row,
    column: &'static str,
    conv: &mut Converter,
) -> Result<i64, SkipReason> {
    let raw = row.text(column);
    match (conv.to_integer(column, raw.as_deref()), raw) {
        (Some(n), _) => Ok(n),
        (None, Some(value)) => Err(SkipReason::Malformed { field: column, value }),
        (None, None) => Err(SkipReason::MissingRequired { field: column }),
    }
}

#[async_trait]
impl TransformUnit for RegisterNumberUnit {
    fn entity(&self) -> EntityKind {
        self.entity
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        _ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let triple = required_text(row, "district_code", conv).and_then(|district| {
            let number = required_number(row, "number", conv)?;
            let year = required_number(row, "year", conv)?;
            Ok((district, number, year))
        });
        let (district_code, number, year) = match triple {
            Ok(t) => t,
            Err(reason) => return Ok(Err(reason)),
        };

        let id = conv.to_identifier(
            self.entity.source_id_column(),
            row.text(self.entity.source_id_column()).as_deref(),
        );

        Ok(Ok(Upsert::new(self.entity.target_table(), REGISTER_KEY)
            .text("id", id)
            .text("district_code", Some(district_code))
            .int("number", Some(number))
            .int("year", Some(year))))
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
    use anyhow::Result;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_duplicate_file_reference_merges_into_one_row() -> Result<()> {
        let db = store().await?;
        stage(
            &db,
            entity(EntityKind::FileReference),
            1,
            &[&["a1", "KGV", "12", "2019"], &["", "KGV", "12", "2019"]],
        )
        .await?;
        let ctx = UnitContext { connector: db.clone(), batch_id: 1, now: now() };
        let unit = RegisterNumberUnit::new(EntityKind::FileReference);

        let run = run_pages(&unit, &ctx, &StagingStore::new(db.clone()), 10, &CancellationToken::new()).await?;
        assert_eq!(run.counters.processed, 2);
        assert_eq!(run.counters.succeeded, 2);

        let rows = db.query("SELECT id, number, year FROM file_references", &[]).await?;
        assert_eq!(rows.len(), 1);
        // The second occurrence has no id and must not erase the first one's
        assert_eq!(rows[0].text("id").as_deref(), Some("a1"));
        assert_eq!(rows[0].int("number"), Some(12));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_numeric_number_rejects_row() -> Result<()> {
        let db = store().await?;
        stage(
            &db,
            entity(EntityKind::EntryNumber),
            1,
            &[&["e1", "KGV", "zwölf", "2019"], &["e2", "KGV", "13", "2019"]],
        )
        .await?;
        let ctx = UnitContext { connector: db.clone(), batch_id: 1, now: now() };
        let unit = RegisterNumberUnit::new(EntityKind::EntryNumber);

        let run = run_pages(&unit, &ctx, &StagingStore::new(db.clone()), 10, &CancellationToken::new()).await?;
        assert_eq!((run.counters.succeeded, run.counters.failed), (1, 1));
        assert!(run.rejections[0].contains("'number' is malformed: 'zwölf'"));
        Ok(())
    }
}
