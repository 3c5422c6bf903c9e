//! Audit record domain entities
//!
//! This module defines the record written for every audited change, the
//! transient field-level change produced by a diff, and the sink contract
//! ([`AuditLog`]) a caller-supplied audit row type implements.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// The operation an audit record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogOperation {
    /// Entity was created
    Create,
    /// Entity value was updated
    Update,
    /// Entity was deleted
    Delete,
    /// Entity is unchanged
    Unchanged,
}

impl LogOperation {
    /// Returns the stored name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOperation::Create => "Create",
            LogOperation::Update => "Update",
            LogOperation::Delete => "Delete",
            LogOperation::Unchanged => "Unchanged",
        }
    }
}

impl fmt::Display for LogOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogOperation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Create" => Ok(LogOperation::Create),
            "Update" => Ok(LogOperation::Update),
            "Delete" => Ok(LogOperation::Delete),
            "Unchanged" => Ok(LogOperation::Unchanged),
            other => Err(DomainError::UnknownLogOperation(other.to_string())),
        }
    }
}

/// A single changed property of a modified entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Name of the changed property
    pub name: String,
    /// Value before the change (`None` for null)
    pub old_value: Option<String>,
    /// Value after the change (`None` for null)
    pub new_value: Option<String>,
}

impl FieldChange {
    /// Creates a field change
    pub fn new(
        name: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            old_value,
            new_value,
        }
    }
}

/// One `{Name, Value}` element of a create/delete snapshot
///
/// Serialized as `{"Name": "...", "Value": "..."}`; a null value is written
/// as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotValue {
    /// Property name
    #[serde(rename = "Name")]
    pub name: String,
    /// Stored representation of the value
    #[serde(rename = "Value")]
    pub value: Option<String>,
}

/// An audit-log record
///
/// Update records carry `property_name`, `old_value` and `new_value`.
/// Create and delete records carry a serialized snapshot in `entity`
/// instead. Records are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the record was built
    created: DateTime<Utc>,
    /// Entity type name
    entity_full_name: String,
    /// Serialized entity key
    entity_id: String,
    /// Audited operation
    log_operation: LogOperation,
    /// Operator responsible for the change
    user: String,
    /// Changed property (updates only)
    property_name: Option<String>,
    /// Previous value (updates only)
    old_value: Option<String>,
    /// New value (updates only)
    new_value: Option<String>,
    /// Serialized snapshot (creates and deletes only)
    entity: Option<String>,
}

impl AuditRecord {
    /// Creates a record with the fields shared by every operation
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use entaudit_core::domain::{AuditRecord, FieldChange, LogOperation};
    ///
    /// let record = AuditRecord::new(Utc::now(), "Company", "5", LogOperation::Update, "alice")
    ///     .with_change(&FieldChange::new("name", Some("Acme".into()), Some("Globex".into())));
    /// assert_eq!(record.property_name(), Some("name"));
    /// assert!(record.entity().is_none());
    /// ```
    pub fn new(
        created: DateTime<Utc>,
        entity_full_name: impl Into<String>,
        entity_id: impl Into<String>,
        log_operation: LogOperation,
        user: impl Into<String>,
    ) -> Self {
        Self {
            created,
            entity_full_name: entity_full_name.into(),
            entity_id: entity_id.into(),
            log_operation,
            user: user.into(),
            property_name: None,
            old_value: None,
            new_value: None,
            entity: None,
        }
    }

    /// Attaches a field-level change
    pub fn with_change(mut self, change: &FieldChange) -> Self {
        self.property_name = Some(change.name.clone());
        self.old_value = change.old_value.clone();
        self.new_value = change.new_value.clone();
        self
    }

    /// Attaches a serialized snapshot
    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.entity = Some(snapshot.into());
        self
    }

    /// Returns when the record was built
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Returns the entity type name
    pub fn entity_full_name(&self) -> &str {
        &self.entity_full_name
    }

    /// Returns the serialized entity key
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the audited operation
    pub fn log_operation(&self) -> LogOperation {
        self.log_operation
    }

    /// Returns the operator
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the changed property name, if any
    pub fn property_name(&self) -> Option<&str> {
        self.property_name.as_deref()
    }

    /// Returns the previous value, if any
    pub fn old_value(&self) -> Option<&str> {
        self.old_value.as_deref()
    }

    /// Returns the new value, if any
    pub fn new_value(&self) -> Option<&str> {
        self.new_value.as_deref()
    }

    /// Returns the serialized snapshot, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Copies every field into a caller-supplied audit row
    pub fn write_to<L: AuditLog + ?Sized>(&self, log: &mut L) {
        log.set_created(self.created);
        log.set_entity_full_name(self.entity_full_name.clone());
        log.set_entity_id(self.entity_id.clone());
        log.set_log_operation(self.log_operation.to_string());
        log.set_user(self.user.clone());
        log.set_property_name(self.property_name.clone());
        log.set_old_value(self.old_value.clone());
        log.set_new_value(self.new_value.clone());
        log.set_entity(self.entity.clone());
    }
}

/// Contract of the row type that stores audit records
///
/// The persistence context creates a fresh row, lets
/// [`AuditRecord::write_to`] fill it, and registers it as a new entity so
/// that it is written in the same transaction as the business data.
pub trait AuditLog {
    /// The time the record was built
    fn set_created(&mut self, created: DateTime<Utc>);

    /// The entity type (table) name
    fn set_entity_full_name(&mut self, name: String);

    /// JSON snapshot of the entity (create and delete records)
    fn set_entity(&mut self, entity: Option<String>);

    /// The serialized key of the changed entity
    fn set_entity_id(&mut self, id: String);

    /// The operator responsible for the change
    fn set_user(&mut self, user: String);

    /// The previous value
    fn set_old_value(&mut self, value: Option<String>);

    /// The new value
    fn set_new_value(&mut self, value: Option<String>);

    /// The property that changed
    fn set_property_name(&mut self, name: Option<String>);

    /// The operation that took place
    fn set_log_operation(&mut self, operation: String);
}
