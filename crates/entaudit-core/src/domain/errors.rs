//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! such as parsing stored enum values and validating schema metadata.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A stored log operation string is not recognised
    #[error("Unknown log operation: {0}")]
    UnknownLogOperation(String),

    /// A stored lifecycle state string is not recognised
    #[error("Unknown lifecycle state: {0}")]
    UnknownLifecycleState(String),

    /// An entity type declares a key column that is not one of its properties
    #[error("Entity type {entity_type} declares unknown key property {property}")]
    UnknownKeyProperty {
        /// The entity type name
        entity_type: String,
        /// The key column that could not be found
        property: String,
    },

    /// An entity type declares no key columns
    #[error("Entity type {0} has no key properties")]
    MissingKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::UnknownLogOperation("Upsert".to_string());
        assert_eq!(err.to_string(), "Unknown log operation: Upsert");

        let err = DomainError::UnknownKeyProperty {
            entity_type: "Company".to_string(),
            property: "code".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Entity type Company declares unknown key property code"
        );

        let err = DomainError::MissingKey("Company".to_string());
        assert_eq!(err.to_string(), "Entity type Company has no key properties");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::UnknownLifecycleState("gone".to_string());
        let err2 = DomainError::UnknownLifecycleState("gone".to_string());
        let err3 = DomainError::UnknownLifecycleState("other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
