// allotment-core/src/application/transform/organisation.rs

// Districts, cadastral districts, staff users, identifiers, field mappings.

use async_trait::async_trait;

use crate::application::transform::lookup;
use crate::application::transform::{
    RowResult, TransformUnit, UnitContext, Upsert, required_id, required_text, text,
};
use crate::domain::conversion::{Converter, IssueKind};
use crate::domain::entity::EntityKind;
use crate::domain::migration::SkipReason;
use crate::error::AllotmentError;
use crate::ports::connector::Row;

const ID_KEY: &[&str] = &["id"];

pub struct DistrictUnit;

#[async_trait]
impl TransformUnit for DistrictUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::District
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        _ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "district_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };
        let name = match required_text(row, "name", conv) {
            Ok(name) => name,
            Err(reason) => return Ok(Err(reason)),
        };

        Ok(Ok(Upsert::new("districts", ID_KEY)
            .text("id", Some(id))
            .text("name", Some(name))
            .bool("active", conv.to_boolean("active", row.text("active").as_deref()))))
    }
}

pub struct CadastralDistrictUnit;

impl CadastralDistrictUnit {
    /// Direct reference first, then the junction mapping by district name.
    async fn resolve_district(
        row: &Row,
        conv: &mut Converter,
        ctx: &UnitContext,
    ) -> Result<Result<String, SkipReason>, AllotmentError> {
        let raw_ref = row.text("district_ref");
        if let Some(candidate) = raw_ref.as_deref().and_then(|r| conv.to_identifier("district_ref", Some(r)))
            && lookup::exists(ctx, "districts", &candidate).await?
        {
            return Ok(Ok(candidate));
        }

        if let Some(code) = text(row, "code", conv)
            && let Some(district) = lookup::district_by_cadastral_code(ctx, &code).await?
        {
            return Ok(Ok(district));
        }

        Ok(Err(SkipReason::UnresolvedReference {
            field: "district_ref",
            value: raw_ref.unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl TransformUnit for CadastralDistrictUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::CadastralDistrict
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "cadastral_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };
        let district_id = match Self::resolve_district(row, conv, ctx).await? {
            Ok(d) => d,
            Err(reason) => return Ok(Err(reason)),
        };

        Ok(Ok(Upsert::new("cadastral_districts", ID_KEY)
            .text("id", Some(id))
            .text("district_id", Some(district_id))
            .text("code", text(row, "code", conv))
            .text("name", text(row, "name", conv))))
    }
}

pub struct UserUnit;

#[async_trait]
impl TransformUnit for UserUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::User
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        _ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "user_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };
        let last_name = match required_text(row, "last_name", conv) {
            Ok(name) => name,
            Err(reason) => return Ok(Err(reason)),
        };

        let raw = |c: &str| row.text(c);
        Ok(Ok(Upsert::new("users", ID_KEY)
            .text("id", Some(id))
            .text("salutation", text(row, "salutation", conv))
            .text("first_name", text(row, "first_name", conv))
            .text("last_name", Some(last_name))
            .text("employee_number", text(row, "employee_number", conv))
            .text("department", text(row, "department", conv))
            .text("room", text(row, "room", conv))
            .text("phone", conv.validate_phone("phone", raw("phone").as_deref()))
            .text("fax", conv.validate_phone("fax", raw("fax").as_deref()))
            .text("email", conv.validate_email("email", raw("email").as_deref()))
            .text("signature_code", text(row, "signature_code", conv))
            .text("job_title", text(row, "job_title", conv))
            .bool("is_admin", conv.to_boolean("is_admin", raw("is_admin").as_deref()))
            .bool(
                "can_administrate",
                conv.to_boolean("can_administrate", raw("can_administrate").as_deref()),
            )
            .bool("active", conv.to_boolean("active", raw("active").as_deref()))))
    }
}

pub struct IdentifierUnit;

#[async_trait]
impl TransformUnit for IdentifierUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::Identifier
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "identifier_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };

        // Optional reference: an unknown user is dropped, the row still loads
        let mut user_id = conv.to_identifier("user_ref", row.text("user_ref").as_deref());
        if let Some(candidate) = user_id.as_deref()
            && !lookup::exists(ctx, "users", candidate).await?
        {
            conv.record("user_ref", candidate, IssueKind::UnresolvedReference);
            user_id = None;
        }

        Ok(Ok(Upsert::new("identifiers", ID_KEY)
            .text("id", Some(id))
            .text("user_id", user_id)
            .text("name", text(row, "name", conv))
            .text("domain", text(row, "domain", conv))))
    }
}

pub struct FieldMappingUnit;

#[async_trait]
impl TransformUnit for FieldMappingUnit {
    fn entity(&self) -> EntityKind {
        EntityKind::FieldMapping
    }

    async fn transform(
        &self,
        row: &Row,
        conv: &mut Converter,
        _ctx: &UnitContext,
    ) -> Result<RowResult, AllotmentError> {
        let id = match required_id(row, "mapping_id", conv) {
            Ok(id) => id,
            Err(reason) => return Ok(Err(reason)),
        };

        Ok(Ok(Upsert::new("field_mappings", ID_KEY)
            .text("id", Some(id))
            .text("database_field", text(row, "database_field", conv))
            .text("document_field", text(row, "document_field", conv))
            .text("comment", text(row, "comment", conv))))
    }
}
