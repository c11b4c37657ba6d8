// allotment-core/src/domain/entity.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Every legacy entity that has a transformation unit.
///
/// Declaration order is the canonical reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    District,
    CadastralDistrict,
    User,
    FileReference,
    EntryNumber,
    Application,
    ApplicationHistory,
    Identifier,
    FieldMapping,
}

/// Junction table staged next to the entities; consumed by the cadastral
/// district fallback lookup, never loaded on its own.
pub const DISTRICT_LINK_STAGING_TABLE: &str = "raw_district_cadastral_links";
pub const DISTRICT_LINK_COLUMNS: &[&str] = &["district_name", "cadastral_code"];

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::District,
        EntityKind::CadastralDistrict,
        EntityKind::User,
        EntityKind::FileReference,
        EntityKind::EntryNumber,
        EntityKind::Application,
        EntityKind::ApplicationHistory,
        EntityKind::Identifier,
        EntityKind::FieldMapping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::District => "districts",
            Self::CadastralDistrict => "cadastral_districts",
            Self::User => "users",
            Self::FileReference => "file_references",
            Self::EntryNumber => "entry_numbers",
            Self::Application => "applications",
            Self::ApplicationHistory => "application_history",
            Self::Identifier => "identifiers",
            Self::FieldMapping => "field_mappings",
        }
    }

    /// Target table name. Matches `as_str` so run-log rows and tables line up.
    pub fn target_table(&self) -> &'static str {
        self.as_str()
    }

    pub fn staging_table(&self) -> &'static str {
        match self {
            Self::District => "raw_districts",
            Self::CadastralDistrict => "raw_cadastral_districts",
            Self::User => "raw_users",
            Self::FileReference => "raw_file_references",
            Self::EntryNumber => "raw_entry_numbers",
            Self::Application => "raw_applications",
            Self::ApplicationHistory => "raw_application_history",
            Self::Identifier => "raw_identifiers",
            Self::FieldMapping => "raw_field_mappings",
        }
    }

    /// Entities that must be loaded before this one.
    ///
    /// Some edges are ordering-only (users after cadastral districts) so the
    /// layered plan reproduces the legacy load order tier by tier.
    pub fn depends_on(&self) -> &'static [EntityKind] {
        match self {
            Self::District => &[],
            Self::CadastralDistrict => &[Self::District],
            Self::User | Self::FileReference | Self::EntryNumber => &[Self::CadastralDistrict],
            Self::Application => &[Self::User, Self::FileReference, Self::EntryNumber],
            Self::ApplicationHistory | Self::FieldMapping => &[Self::Application],
            Self::Identifier => &[Self::User, Self::Application],
        }
    }

    /// Columns of the legacy export, all staged as text.
    /// The first column carries the legacy identifier.
    pub fn staging_columns(&self) -> &'static [&'static str] {
        match self {
            Self::District => &["district_id", "name", "active"],
            Self::CadastralDistrict => &[
                "cadastral_id",
                "district_ref",
                "code",
                "name",
            ],
            Self::User => &[
                "user_id",
                "salutation",
                "first_name",
                "last_name",
                "employee_number",
                "department",
                "room",
                "phone",
                "fax",
                "email",
                "signature_code",
                "job_title",
                "is_admin",
                "can_administrate",
                "active",
            ],
            Self::FileReference => &["reference_id", "district_code", "number", "year"],
            Self::EntryNumber => &["entry_id", "district_code", "number", "year"],
            Self::Application => &[
                "application_id",
                "file_reference",
                "waiting_list_32",
                "waiting_list_33",
                "salutation",
                "title",
                "first_name",
                "last_name",
                "birth_date",
                "salutation_2",
                "first_name_2",
                "last_name_2",
                "birth_date_2",
                "letter_salutation",
                "street",
                "postal_code",
                "city",
                "phone",
                "mobile_phone",
                "business_phone",
                "email",
                "application_date",
                "confirmation_date",
                "current_offer_date",
                "deletion_date",
                "deactivated_at",
                "preferences",
                "remarks",
                "active",
            ],
            Self::ApplicationHistory => &[
                "history_id",
                "application_ref",
                "file_reference",
                "action_type",
                "action_date",
                "cadastral_area",
                "plot_section",
                "parcel",
                "size_info",
                "case_worker",
                "note",
                "comment",
            ],
            Self::Identifier => &["identifier_id", "user_ref", "name", "domain"],
            Self::FieldMapping => &[
                "mapping_id",
                "database_field",
                "document_field",
                "comment",
            ],
        }
    }

    pub fn source_id_column(&self) -> &'static str {
        self.staging_columns()[0]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|e| e.as_str() == needle || e.staging_table() == needle)
            .ok_or(DomainError::UnknownEntity(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_parsing_accepts_target_and_staging_names() -> anyhow::Result<()> {
        assert_eq!("applications".parse::<EntityKind>()?, EntityKind::Application);
        assert_eq!("RAW_USERS".parse::<EntityKind>()?, EntityKind::User);
        assert!(matches!(
            "plots".parse::<EntityKind>(),
            Err(DomainError::UnknownEntity(_))
        ));
        Ok(())
    }

    #[test]
    fn test_dependencies_point_backwards() {
        for entity in EntityKind::ALL {
            for dep in entity.depends_on() {
                assert!(dep < &entity, "{} depends on later {}", entity, dep);
            }
        }
    }
}
