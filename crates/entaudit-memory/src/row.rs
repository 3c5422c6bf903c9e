//! Default audit-log row

use chrono::{DateTime, Utc};
use entaudit_core::domain::{AuditLog, DomainError, LogOperation};
use serde::Serialize;

/// One row of the audit-log table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditLogRow {
    pub created: DateTime<Utc>,
    pub entity_full_name: String,
    pub entity_id: String,
    pub log_operation: String,
    pub user: String,
    pub property_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub entity: Option<String>,
}

impl AuditLogRow {
    /// Parses the stored operation name
    pub fn operation(&self) -> Result<LogOperation, DomainError> {
        self.log_operation.parse()
    }
}

impl AuditLog for AuditLogRow {
    fn set_created(&mut self, created: DateTime<Utc>) {
        self.created = created;
    }

    fn set_entity_full_name(&mut self, name: String) {
        self.entity_full_name = name;
    }

    fn set_entity(&mut self, entity: Option<String>) {
        self.entity = entity;
    }

    fn set_entity_id(&mut self, id: String) {
        self.entity_id = id;
    }

    fn set_user(&mut self, user: String) {
        self.user = user;
    }

    fn set_old_value(&mut self, value: Option<String>) {
        self.old_value = value;
    }

    fn set_new_value(&mut self, value: Option<String>) {
        self.new_value = value;
    }

    fn set_property_name(&mut self, name: Option<String>) {
        self.property_name = name;
    }

    fn set_log_operation(&mut self, operation: String) {
        self.log_operation = operation;
    }
}

#[cfg(test)]
mod tests {
    use entaudit_core::domain::{AuditRecord, FieldChange};

    use super::*;

    #[test]
    fn test_record_round_trips_through_row() {
        let record = AuditRecord::new(
            Utc::now(),
            "Company",
            "a=1►b=2",
            LogOperation::Update,
            "alice",
        )
        .with_change(&FieldChange::new("name", Some("Acme".into()), None));

        let mut row = AuditLogRow::default();
        record.write_to(&mut row);

        assert_eq!(row.created, record.created());
        assert_eq!(row.entity_id, "a=1►b=2");
        assert_eq!(row.log_operation, "Update");
        assert_eq!(row.operation().unwrap(), LogOperation::Update);
        assert_eq!(row.property_name.as_deref(), Some("name"));
        assert_eq!(row.old_value.as_deref(), Some("Acme"));
        assert!(row.new_value.is_none());
        assert!(row.entity.is_none());
    }

    #[test]
    fn test_unknown_stored_operation() {
        let row = AuditLogRow {
            log_operation: "Merge".into(),
            ..Default::default()
        };
        assert!(row.operation().is_err());
    }
}
