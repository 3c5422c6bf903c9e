//! Persistence context ports (driven/secondary ports)
//!
//! This module defines what an object-relational persistence context must
//! expose to be audited.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   must reach the caller unchanged; the audit pipeline wraps them
//!   transparently and never inspects them.
//! - [`ChangeTracker`] is read-only. Everything that mutates the context
//!   (transactions, saves, audit-row registration) lives on
//!   [`PersistenceContext`], which the audit pipeline borrows mutably for the
//!   duration of one save call.
//! - Entry handles are re-resolved on every read, so entries enumerated
//!   before the first save observe the keys that save generated.

use tokio_util::sync::CancellationToken;

use crate::domain::{
    AuditRecord, EntityKey, EntryId, PropertyValues, SchemaMetadata, TrackedEntry, Value,
};

/// Read access to the change tracker of a unit-of-work
pub trait ChangeTracker {
    /// Enumerates every tracked entry with its current lifecycle state
    ///
    /// The returned list is a snapshot; the tracker may change after a save.
    fn entries(&self) -> Vec<TrackedEntry>;

    /// Returns the current value of `property`
    ///
    /// Returns `None` if the entry or the property is unknown to the tracker.
    fn current_value(&self, entry: EntryId, property: &str) -> Option<Value>;

    /// Returns the value `property` had when the entry was loaded or last saved
    ///
    /// Returns `None` if the entry or the property is unknown to the tracker.
    fn original_value(&self, entry: EntryId, property: &str) -> Option<Value>;

    /// Resolves the primary key of the entry
    ///
    /// Returns `None` when the tracker has no key for the entry, for example
    /// an added entry whose generated key has not been assigned yet.
    fn entity_key(&self, entry: EntryId) -> Option<EntityKey>;

    /// Re-reads the persisted column values of the entry's row
    ///
    /// Returns `Ok(None)` if no persisted row exists for the entry's key.
    fn database_values(&self, entry: EntryId) -> anyhow::Result<Option<PropertyValues>>;
}

/// A unit-of-work that can be saved inside an explicit transaction
///
/// ## Implementation Notes
///
/// - `connection_identity` must be stable for a given database; it keys the
///   shared audit-policy cache.
/// - `add_audit_record` registers a new audit row as an added entity; it is
///   written by the next `save_changes` call.
/// - `save_changes` returns the number of rows written.
pub trait PersistenceContext: ChangeTracker {
    /// Stable identity of the target database/connection
    fn connection_identity(&self) -> &str;

    /// Reads the mapped-type metadata of this context
    fn schema(&self) -> anyhow::Result<SchemaMetadata>;

    /// Opens a transaction spanning every following save
    fn begin_transaction(&mut self) -> anyhow::Result<()>;

    /// Commits the open transaction
    fn commit_transaction(&mut self) -> anyhow::Result<()>;

    /// Rolls back the open transaction
    fn rollback_transaction(&mut self) -> anyhow::Result<()>;

    /// Registers an audit record to be written by the next save
    fn add_audit_record(&mut self, record: AuditRecord) -> anyhow::Result<()>;

    /// Writes all pending changes and returns the number of affected rows
    fn save_changes(&mut self) -> anyhow::Result<u64>;
}

/// A persistence context whose underlying save can suspend on I/O
#[async_trait::async_trait]
pub trait AsyncPersistenceContext: PersistenceContext + Send {
    /// Asynchronously writes all pending changes
    ///
    /// Implementations should stop early with an error once `cancel` fires.
    async fn save_changes_async(&mut self, cancel: CancellationToken) -> anyhow::Result<u64>;
}
