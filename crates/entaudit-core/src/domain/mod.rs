//! Domain entities and value types
//!
//! This module contains the core domain types for entaudit:
//! - Scalar property values and ordered value lists
//! - Tracked entries, lifecycle states and entity keys
//! - Schema metadata carrying the auditable/not-auditable markers
//! - Audit records, field changes and snapshot values
//! - Domain-specific error types

pub mod audit;
pub mod entity;
pub mod errors;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use audit::{AuditLog, AuditRecord, FieldChange, LogOperation, SnapshotValue};
pub use entity::{EntityKey, EntryId, LifecycleState, TrackedEntry, KEY_SEPARATOR};
pub use errors::DomainError;
pub use schema::{EntityTypeMetadata, PropertyKind, PropertyMetadata, SchemaMetadata};
pub use value::{PropertyValues, Value};
