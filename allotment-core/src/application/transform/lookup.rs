// allotment-core/src/application/transform/lookup.rs

// Reference resolution against already-loaded target tables.

use crate::application::transform::UnitContext;
use crate::domain::entity::DISTRICT_LINK_STAGING_TABLE;
use crate::domain::quality::rule::quote_ident;
use crate::error::AllotmentError;
use crate::ports::connector::SqlValue;

pub async fn exists(ctx: &UnitContext, table: &str, id: &str) -> Result<bool, AllotmentError> {
    let found = ctx
        .connector
        .query_scalar(
            &format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", quote_ident(table)),
            &[SqlValue::from(id)],
        )
        .await?;
    Ok(found.is_some())
}

/// District of a cadastral district code, through the staged junction
/// (district name, cadastral code) and a case-insensitive name match.
pub async fn district_by_cadastral_code(
    ctx: &UnitContext,
    code: &str,
) -> Result<Option<String>, AllotmentError> {
    let sql = format!(
        "SELECT d.id FROM {} AS l \
         JOIN districts AS d ON lower(trim(d.name)) = lower(trim(l.district_name)) \
         WHERE l.batch_id = ? AND trim(l.cadastral_code) = ? \
         ORDER BY d.id LIMIT 1",
        quote_ident(DISTRICT_LINK_STAGING_TABLE)
    );
    let found = ctx
        .connector
        .query_scalar(&sql, &[SqlValue::Int(ctx.batch_id), SqlValue::from(code.trim())])
        .await?;
    Ok(found.and_then(|v| v.as_text()))
}

pub async fn application_by_file_reference(
    ctx: &UnitContext,
    file_reference: &str,
) -> Result<Option<String>, AllotmentError> {
    let found = ctx
        .connector
        .query_scalar(
            "SELECT id FROM applications WHERE file_reference = ? ORDER BY id LIMIT 1",
            &[SqlValue::from(file_reference.trim())],
        )
        .await?;
    Ok(found.and_then(|v| v.as_text()))
}
