//! Error types for the audit pipeline
//!
//! Every error aborts the save call it occurs in. Errors raised after the
//! transaction was opened cause a rollback before they reach the caller.
//! Failures of the underlying save are wrapped transparently so that the
//! caller sees the original message and can downcast to the original type.

use entaudit_core::domain::DomainError;
use thiserror::Error;

/// Errors raised while resolving the audit policy
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The context could not provide its mapped-type metadata
    #[error("schema metadata unavailable: {0}")]
    MetadataUnavailable(#[source] anyhow::Error),

    /// The same entity type is mapped twice
    #[error("entity type {0} is mapped more than once")]
    DuplicateEntityType(String),

    /// An entity type's metadata is inconsistent
    #[error("invalid metadata: {0}")]
    InvalidMetadata(#[from] DomainError),
}

/// Errors that can occur during an audited save
#[derive(Debug, Error)]
pub enum AuditError {
    /// The audit policy could not be resolved; no transaction was opened
    #[error("audit policy error: {0}")]
    Policy(#[from] PolicyError),

    /// A tracked entry has no resolvable primary key
    #[error("missing entity key for tracked {entity_type} entry")]
    MissingEntityKey {
        /// The entity type of the entry
        entity_type: String,
    },

    /// The tracker does not know a property the policy includes
    #[error("tracker has no property {property} on {entity_type}")]
    UnknownProperty {
        /// The entity type of the entry
        entity_type: String,
        /// The property that could not be read
        property: String,
    },

    /// Database comparison found no persisted row for a modified entry
    #[error("no persisted row for {entity_type} with key {key}")]
    MissingDatabaseRow {
        /// The entity type of the entry
        entity_type: String,
        /// The serialized key of the entry
        key: String,
    },

    /// Re-reading persisted values failed
    #[error("failed to read database values: {0}")]
    DatabaseValues(#[source] anyhow::Error),

    /// A create/delete snapshot could not be serialized
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The context rejected an audit record
    #[error("failed to register audit record: {0}")]
    Sink(#[source] anyhow::Error),

    /// Opening or committing the transaction failed
    #[error("transaction error: {0}")]
    Transaction(#[source] anyhow::Error),

    /// The underlying save failed
    #[error(transparent)]
    UnderlyingSave(anyhow::Error),
}

impl AuditError {
    /// Returns the underlying save error, if this is one
    pub fn underlying(&self) -> Option<&anyhow::Error> {
        match self {
            AuditError::UnderlyingSave(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("unique constraint violated on Company.code")]
    struct ConstraintViolation;

    #[test]
    fn test_underlying_save_is_transparent() {
        let err = AuditError::UnderlyingSave(anyhow::Error::new(ConstraintViolation));
        assert_eq!(err.to_string(), "unique constraint violated on Company.code");
        assert!(err
            .underlying()
            .and_then(|e| e.downcast_ref::<ConstraintViolation>())
            .is_some());
    }

    #[test]
    fn test_error_display() {
        let err = AuditError::MissingEntityKey {
            entity_type: "Company".to_string(),
        };
        assert_eq!(err.to_string(), "missing entity key for tracked Company entry");

        let err = AuditError::from(PolicyError::DuplicateEntityType("Company".to_string()));
        assert_eq!(
            err.to_string(),
            "audit policy error: entity type Company is mapped more than once"
        );
        assert!(err.underlying().is_none());
    }
}
