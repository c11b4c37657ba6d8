pub mod conversion;
pub mod entity;
pub mod error;
pub mod graph;
pub mod migration;
pub mod monitoring;
pub mod project;
pub mod quality;
pub mod severity;

pub use entity::EntityKind;
pub use error::DomainError;
pub use severity::Severity;
