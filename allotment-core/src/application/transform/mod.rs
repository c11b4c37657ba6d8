// allotment-core/src/application/transform/mod.rs

//! One transformation unit per target entity.

pub mod applications;
pub mod lookup;
pub mod organisation;
pub mod registers;
pub mod runner;
pub mod upsert;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::conversion::Converter;
use crate::domain::entity::EntityKind;
use crate::domain::migration::SkipReason;
use crate::error::AllotmentError;
use crate::ports::connector::{Connector, Row};

pub use runner::{UnitRun, run_pages};
pub use upsert::Upsert;

/// Shared state of one unit execution.
pub struct UnitContext {
    pub connector: Arc<dyn Connector>,
    pub batch_id: i64,
    pub now: NaiveDateTime,
}

/// Row result: the upsert to perform, or why the row is rejected.
pub type RowResult = Result<Upsert, SkipReason>;

#[async_trait]
pub trait TransformUnit: Send + Sync {
    fn entity(&self) -> EntityKind;

    /// Converts one staged row.
    ///
    /// Field problems go to `conv` and rejections to `Ok(Err(_))`; an `Err`
    /// is reserved for faults that make the whole unit fail.
    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError>;
}

/// The unit loading `entity`.
pub fn unit_for(entity: EntityKind) -> Arc<dyn TransformUnit> {
    match entity {
        EntityKind::District => Arc::new(organisation::DistrictUnit),
        EntityKind::CadastralDistrict => Arc::new(organisation::CadastralDistrictUnit),
        EntityKind::User => Arc::new(organisation::UserUnit),
        EntityKind::FileReference | EntityKind::EntryNumber => {
            Arc::new(registers::RegisterNumberUnit::new(entity))
        }
        EntityKind::Application => Arc::new(applications::ApplicationUnit),
        EntityKind::ApplicationHistory => Arc::new(applications::HistoryUnit),
        EntityKind::Identifier => Arc::new(organisation::IdentifierUnit),
        EntityKind::FieldMapping => Arc::new(organisation::FieldMappingUnit),
    }
}

/// Required identifier column: absent or malformed rejects the row.
pub(crate) fn required_id(
    row: &Row,
    column: &'static str,
    conv: &mut Converter,
) -> Result<String, SkipReason> {
    conv.to_identifier(column, row.text(column).as_deref())
        .ok_or(SkipReason::MissingRequired { field: column })
}

pub(crate) fn required_text(
    row: &Row,
    column: &'static str,
    conv: &mut Converter,
) -> Result<String, SkipReason> {
    conv.to_text(row.text(column).as_deref())
        .ok_or(SkipReason::MissingRequired { field: column })
}

pub(crate) fn text(row: &Row, column: &str, conv: &mut Converter) -> Option<String> {
    conv.to_text(row.text(column).as_deref())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::application::staging::{StagedTable, StagingStore};
    use crate::domain::entity::EntityKind;
    use crate::infrastructure::adapters::DuckDBConnector;
    use crate::infrastructure::schema::bootstrap;
    use crate::ports::connector::Connector;

    pub async fn store() -> anyhow::Result<Arc<dyn Connector>> {
        let db: Arc<dyn Connector> = Arc::new(DuckDBConnector::in_memory()?);
        bootstrap(db.as_ref()).await?;
        Ok(db)
    }

    /// Stages rows given as `&str` cells as-is; `append` stores "" as NULL.
    pub async fn stage(
        db: &Arc<dyn Connector>,
        target: StagedTable,
        batch_id: i64,
        rows: &[&[&str]],
    ) -> anyhow::Result<()> {
        let rows: Vec<Vec<Option<String>>> = rows
            .iter()
            .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
            .collect();
        StagingStore::new(db.clone())
            .append(target, batch_id, &rows)
            .await?;
        Ok(())
    }

    pub fn entity(e: EntityKind) -> StagedTable {
        StagedTable::Entity(e)
    }
}
