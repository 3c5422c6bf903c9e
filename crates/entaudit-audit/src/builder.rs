//! Materialization of audit records

use chrono::Utc;
use entaudit_core::domain::{AuditRecord, FieldChange, LogOperation, SnapshotValue, TrackedEntry};
use entaudit_core::ports::ChangeTracker;
use tracing::trace;

use crate::error::AuditError;

/// Turns diffs and snapshots into [`AuditRecord`]s
pub struct AuditRecordBuilder;

impl AuditRecordBuilder {
    /// Builds the audit records for one entry
    ///
    /// - `Update`: one record per element of `diff`
    /// - `Create`: one record with a snapshot of the current values
    /// - `Delete`: one record with a snapshot of the original values
    /// - `Unchanged`, an empty `included` list or an empty update diff: none
    ///
    /// The entity key is read exactly once, before anything else. Every
    /// record of the call shares the same `created` timestamp.
    ///
    /// # Errors
    ///
    /// - [`AuditError::MissingEntityKey`] if the entry has no key or an empty one
    /// - [`AuditError::UnknownProperty`] if a snapshot property is unknown
    /// - [`AuditError::Serialization`] if the snapshot cannot be serialized
    pub fn build<T>(
        tracker: &T,
        entry: &TrackedEntry,
        operation: LogOperation,
        included: &[String],
        diff: &[FieldChange],
        user: &str,
    ) -> Result<Vec<AuditRecord>, AuditError>
    where
        T: ChangeTracker + ?Sized,
    {
        let key = tracker
            .entity_key(entry.id)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AuditError::MissingEntityKey {
                entity_type: entry.entity_type.clone(),
            })?
            .to_key_string();

        if included.is_empty() {
            return Ok(Vec::new());
        }

        let created = Utc::now();
        let base = || {
            AuditRecord::new(
                created,
                entry.entity_type.as_str(),
                key.as_str(),
                operation,
                user,
            )
        };

        let records = match operation {
            LogOperation::Update => diff
                .iter()
                .map(|change| base().with_change(change))
                .collect(),
            LogOperation::Create | LogOperation::Delete => {
                let snapshot = Self::snapshot(tracker, entry, operation, included)?;
                vec![base().with_snapshot(snapshot)]
            }
            LogOperation::Unchanged => Vec::new(),
        };

        trace!(
            entity_type = %entry.entity_type,
            key = %key,
            %operation,
            records = records.len(),
            "Built audit records"
        );
        Ok(records)
    }

    fn snapshot<T>(
        tracker: &T,
        entry: &TrackedEntry,
        operation: LogOperation,
        included: &[String],
    ) -> Result<String, AuditError>
    where
        T: ChangeTracker + ?Sized,
    {
        let values = included
            .iter()
            .map(|name| {
                let value = match operation {
                    LogOperation::Delete => tracker.original_value(entry.id, name),
                    _ => tracker.current_value(entry.id, name),
                };
                value
                    .map(|v| SnapshotValue {
                        name: name.clone(),
                        value: v.to_audit_string(),
                    })
                    .ok_or_else(|| AuditError::UnknownProperty {
                        entity_type: entry.entity_type.clone(),
                        property: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(serde_json::to_string(&values)?)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use entaudit_core::domain::{EntityKey, EntryId, LifecycleState, PropertyValues, Value};

    use super::*;

    #[derive(Default)]
    struct FakeTracker {
        key: Option<EntityKey>,
        original: PropertyValues,
        current: PropertyValues,
        key_reads: Cell<usize>,
    }

    impl ChangeTracker for FakeTracker {
        fn entries(&self) -> Vec<TrackedEntry> {
            Vec::new()
        }

        fn current_value(&self, _entry: EntryId, property: &str) -> Option<Value> {
            self.current.get(property).cloned()
        }

        fn original_value(&self, _entry: EntryId, property: &str) -> Option<Value> {
            self.original.get(property).cloned()
        }

        fn entity_key(&self, _entry: EntryId) -> Option<EntityKey> {
            self.key_reads.set(self.key_reads.get() + 1);
            self.key.clone()
        }

        fn database_values(&self, _entry: EntryId) -> anyhow::Result<Option<PropertyValues>> {
            Ok(None)
        }
    }

    fn tracker() -> FakeTracker {
        FakeTracker {
            key: Some(EntityKey::single("id", 7i64)),
            original: PropertyValues::new()
                .with("id", 7i64)
                .with("name", "Acme")
                .with("phone", "555-0100"),
            current: PropertyValues::new()
                .with("id", 7i64)
                .with("name", "Globex")
                .with("phone", Value::Null),
            ..Default::default()
        }
    }

    fn entry(state: LifecycleState) -> TrackedEntry {
        TrackedEntry::new(EntryId::new(3), "Company", state)
    }

    fn included() -> Vec<String> {
        vec!["id".into(), "name".into(), "phone".into()]
    }

    #[test]
    fn test_update_emits_one_record_per_change() {
        let tracker = tracker();
        let diff = vec![
            FieldChange::new("name", Some("Acme".into()), Some("Globex".into())),
            FieldChange::new("phone", Some("555-0100".into()), None),
        ];

        let records = AuditRecordBuilder::build(
            &tracker,
            &entry(LifecycleState::Modified),
            LogOperation::Update,
            &included(),
            &diff,
            "alice",
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(tracker.key_reads.get(), 1);
        for record in &records {
            assert_eq!(record.entity_full_name(), "Company");
            assert_eq!(record.entity_id(), "7");
            assert_eq!(record.user(), "alice");
            assert_eq!(record.log_operation(), LogOperation::Update);
            assert!(record.entity().is_none());
            assert_eq!(record.created(), records[0].created());
        }
        assert_eq!(records[0].property_name(), Some("name"));
        assert_eq!(records[0].old_value(), Some("Acme"));
        assert_eq!(records[0].new_value(), Some("Globex"));
        assert_eq!(records[1].new_value(), None);
    }

    #[test]
    fn test_update_with_empty_diff_emits_nothing() {
        let records = AuditRecordBuilder::build(
            &tracker(),
            &entry(LifecycleState::Modified),
            LogOperation::Update,
            &included(),
            &[],
            "alice",
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_create_snapshot_uses_current_values() {
        let records = AuditRecordBuilder::build(
            &tracker(),
            &entry(LifecycleState::Added),
            LogOperation::Create,
            &included(),
            &[],
            "alice",
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.log_operation(), LogOperation::Create);
        assert!(record.property_name().is_none());
        assert_eq!(
            record.entity(),
            Some(r#"[{"Name":"id","Value":"7"},{"Name":"name","Value":"Globex"},{"Name":"phone","Value":null}]"#)
        );
    }

    #[test]
    fn test_delete_snapshot_uses_original_values() {
        let records = AuditRecordBuilder::build(
            &tracker(),
            &entry(LifecycleState::Deleted),
            LogOperation::Delete,
            &included(),
            &[],
            "",
        )
        .unwrap();

        let snapshot: Vec<SnapshotValue> =
            serde_json::from_str(records[0].entity().unwrap()).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[1].value.as_deref(), Some("Acme"));
        assert_eq!(snapshot[2].value.as_deref(), Some("555-0100"));
        assert_eq!(records[0].user(), "");
    }

    #[test]
    fn test_empty_included_or_unchanged_emits_nothing() {
        let tracker = tracker();
        let none = AuditRecordBuilder::build(
            &tracker,
            &entry(LifecycleState::Added),
            LogOperation::Create,
            &[],
            &[],
            "alice",
        )
        .unwrap();
        assert!(none.is_empty());

        let none = AuditRecordBuilder::build(
            &tracker,
            &entry(LifecycleState::Unchanged),
            LogOperation::Unchanged,
            &included(),
            &[],
            "alice",
        )
        .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let tracker = FakeTracker {
            key: None,
            ..tracker()
        };
        let err = AuditRecordBuilder::build(
            &tracker,
            &entry(LifecycleState::Added),
            LogOperation::Create,
            &included(),
            &[],
            "alice",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AuditError::MissingEntityKey { ref entity_type } if entity_type == "Company"
        ));
    }

    #[test]
    fn test_empty_key_is_an_error() {
        let tracker = FakeTracker {
            key: Some(EntityKey::new(Vec::new())),
            ..tracker()
        };
        let err = AuditRecordBuilder::build(
            &tracker,
            &entry(LifecycleState::Added),
            LogOperation::Create,
            &included(),
            &[],
            "alice",
        )
        .unwrap_err();
        assert!(matches!(err, AuditError::MissingEntityKey { .. }));
    }

    #[test]
    fn test_composite_key_serialization() {
        let tracker = FakeTracker {
            key: Some(EntityKey::single("a", "1").and("b", "2")),
            ..tracker()
        };
        let diff = vec![FieldChange::new("name", None, Some("x".into()))];
        let records = AuditRecordBuilder::build(
            &tracker,
            &entry(LifecycleState::Modified),
            LogOperation::Update,
            &included(),
            &diff,
            "alice",
        )
        .unwrap();
        assert_eq!(records[0].entity_id(), "a=1►b=2");
    }
}
