//! Field-level diffs of modified entries

use entaudit_core::domain::{FieldChange, TrackedEntry, Value};
use entaudit_core::ports::ChangeTracker;
use tracing::trace;

use crate::error::AuditError;

/// Source of the "before" values of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompareMode {
    /// Use the original values remembered by the change tracker
    #[default]
    InMemoryValues,
    /// Re-read the persisted row and compare against it
    DatabaseValues,
}

impl CompareMode {
    /// Maps `AuditSettings::use_database_value_compare` to a mode
    pub fn from_database_compare(use_database_value_compare: bool) -> Self {
        if use_database_value_compare {
            CompareMode::DatabaseValues
        } else {
            CompareMode::InMemoryValues
        }
    }
}

/// Computes field-level changes for one modified entry
pub struct DiffEngine;

impl DiffEngine {
    /// Returns the changed properties among `included`
    ///
    /// In [`CompareMode::InMemoryValues`] changes are reported in `included`
    /// order. In [`CompareMode::DatabaseValues`] they are reported in the
    /// column order of the persisted row, restricted to `included`.
    ///
    /// # Errors
    ///
    /// - [`AuditError::UnknownProperty`] if the tracker cannot resolve an
    ///   included property
    /// - [`AuditError::MissingDatabaseRow`] if no persisted row exists
    /// - [`AuditError::DatabaseValues`] if re-reading the row fails
    pub fn diff<T>(
        tracker: &T,
        entry: &TrackedEntry,
        included: &[String],
        mode: CompareMode,
    ) -> Result<Vec<FieldChange>, AuditError>
    where
        T: ChangeTracker + ?Sized,
    {
        if included.is_empty() {
            return Ok(Vec::new());
        }

        let changes = match mode {
            CompareMode::InMemoryValues => Self::diff_in_memory(tracker, entry, included)?,
            CompareMode::DatabaseValues => Self::diff_database(tracker, entry, included)?,
        };

        trace!(
            entity_type = %entry.entity_type,
            entry = %entry.id,
            changes = changes.len(),
            ?mode,
            "Computed diff"
        );
        Ok(changes)
    }

    fn diff_in_memory<T>(
        tracker: &T,
        entry: &TrackedEntry,
        included: &[String],
    ) -> Result<Vec<FieldChange>, AuditError>
    where
        T: ChangeTracker + ?Sized,
    {
        let mut changes = Vec::new();
        for name in included {
            let original = tracker
                .original_value(entry.id, name)
                .ok_or_else(|| unknown_property(entry, name))?;
            let current = current_value(tracker, entry, name)?;
            if original != current {
                changes.push(change(name, &original, &current));
            }
        }
        Ok(changes)
    }

    fn diff_database<T>(
        tracker: &T,
        entry: &TrackedEntry,
        included: &[String],
    ) -> Result<Vec<FieldChange>, AuditError>
    where
        T: ChangeTracker + ?Sized,
    {
        let persisted = tracker
            .database_values(entry.id)
            .map_err(AuditError::DatabaseValues)?
            .ok_or_else(|| AuditError::MissingDatabaseRow {
                entity_type: entry.entity_type.clone(),
                key: tracker
                    .entity_key(entry.id)
                    .map(|key| key.to_key_string())
                    .unwrap_or_else(|| entry.id.to_string()),
            })?;

        let mut changes = Vec::new();
        for (name, stored) in persisted.iter() {
            if !included.iter().any(|p| p == name) {
                continue;
            }
            let current = current_value(tracker, entry, name)?;
            if *stored != current {
                changes.push(change(name, stored, &current));
            }
        }
        Ok(changes)
    }
}

fn current_value<T>(tracker: &T, entry: &TrackedEntry, name: &str) -> Result<Value, AuditError>
where
    T: ChangeTracker + ?Sized,
{
    tracker
        .current_value(entry.id, name)
        .ok_or_else(|| unknown_property(entry, name))
}

fn unknown_property(entry: &TrackedEntry, name: &str) -> AuditError {
    AuditError::UnknownProperty {
        entity_type: entry.entity_type.clone(),
        property: name.to_string(),
    }
}

fn change(name: &str, old: &Value, new: &Value) -> FieldChange {
    FieldChange::new(name, old.to_audit_string(), new.to_audit_string())
}
