//! entaudit Memory - In-process persistence context
//!
//! A unit-of-work over in-memory tables for:
//! - Change tracking with original and current values
//! - Identity key generation for single integer keys
//! - Transactions with snapshot rollback
//! - Audit-log rows written alongside business rows
//!
//! ## Architecture
//!
//! This crate implements the `PersistenceContext` and
//! `AsyncPersistenceContext` ports from `entaudit-core`. It is a driven
//! (secondary) adapter in the hexagonal architecture, used by the
//! integration tests and the CLI demo.
//!
//! ## Key Components
//!
//! - [`MemoryContext`] - Tables, change tracker and transactions
//! - [`AuditLogRow`] - Default audit row type
//! - [`MemoryError`] - Error types for adapter operations
//!
//! ## Usage
//!
//! ```
//! use entaudit_core::domain::{
//!     EntityTypeMetadata, PropertyMetadata, PropertyValues, SchemaMetadata,
//! };
//! use entaudit_core::ports::PersistenceContext;
//! use entaudit_memory::MemoryContext;
//!
//! # fn example() -> anyhow::Result<()> {
//! let schema = SchemaMetadata::new().with_entity(
//!     EntityTypeMetadata::new("Company")
//!         .key("id")
//!         .with_property(PropertyMetadata::scalar("name")),
//! );
//! let mut ctx: MemoryContext = MemoryContext::new("memory://demo", schema);
//! ctx.insert("Company", PropertyValues::new().with("name", "Acme"))?;
//! assert_eq!(ctx.save_changes()?, 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod context;
pub mod row;

pub use context::MemoryContext;
pub use row::AuditLogRow;

use entaudit_core::domain::EntryId;

/// Errors that can occur in the in-memory persistence context
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The entity type is not part of the schema
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// The entry is not tracked by this context
    #[error("Unknown entry: {0}")]
    UnknownEntry(EntryId),

    /// The property is not declared on the entity type
    #[error("Unknown property {property} on {entity_type}")]
    UnknownProperty { entity_type: String, property: String },

    /// A row with the same key already exists
    #[error("Duplicate key {key} for {entity_type}")]
    DuplicateKey { entity_type: String, key: String },

    /// No persisted row has the key
    #[error("Row not found: {entity_type} {key}")]
    RowNotFound { entity_type: String, key: String },

    /// An added entity has an unassigned key that cannot be generated
    #[error("Key of new {0} cannot be generated")]
    MissingKey(String),

    /// `begin_transaction` was called twice
    #[error("A transaction is already active")]
    TransactionAlreadyActive,

    /// Commit or rollback without a transaction
    #[error("No active transaction")]
    NoActiveTransaction,

    /// The save was cancelled before it started writing
    #[error("Save cancelled")]
    Cancelled,
}
