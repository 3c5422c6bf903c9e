//! In-memory unit-of-work
//!
//! [`MemoryContext`] keeps one table per mapped entity type and a change
//! tracker over the entities the caller inserted or loaded. A save applies
//! every pending change to a copy of the tables and swaps it in only when
//! all of them succeeded, so a failed save leaves the context untouched.
//!
//! An open transaction snapshots the whole context, tracker included;
//! rolling back restores that snapshot.

use std::collections::{BTreeMap, HashMap};

use entaudit_core::domain::{
    AuditLog, AuditRecord, EntityKey, EntityTypeMetadata, EntryId, LifecycleState,
    PropertyValues, SchemaMetadata, TrackedEntry, Value,
};
use entaudit_core::ports::{AsyncPersistenceContext, ChangeTracker, PersistenceContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::row::AuditLogRow;
use crate::MemoryError;

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<PropertyValues>,
    next_identity: i64,
}

impl Table {
    fn position(&self, meta: &EntityTypeMetadata, key: &EntityKey) -> Option<usize> {
        self.rows.iter().position(|row| key_of(meta, row) == *key)
    }

    /// Assigns the next identity value to a single, unset integer key
    fn assign_identity(
        &mut self,
        meta: &EntityTypeMetadata,
        values: &mut PropertyValues,
    ) -> Result<(), MemoryError> {
        let key = key_of(meta, values);
        if !key.is_temporary() {
            if let [column] = meta.key.as_slice() {
                if let Some(Value::Int(id)) = values.get(column) {
                    self.next_identity = self.next_identity.max(id + 1);
                }
            }
            return Ok(());
        }

        match meta.key.as_slice() {
            [column] => {
                let id = self.next_identity;
                self.next_identity += 1;
                values.set(column.as_str(), id);
                Ok(())
            }
            _ => Err(MemoryError::MissingKey(meta.name.clone())),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    entity_type: String,
    state: LifecycleState,
    original: PropertyValues,
    current: PropertyValues,
}

#[derive(Debug, Clone)]
struct State<L> {
    tables: HashMap<String, Table>,
    slots: BTreeMap<EntryId, Slot>,
    next_entry: u64,
    pending_audit: Vec<L>,
    audit_log: Vec<L>,
}

/// In-process persistence context generic over the audit row type
#[derive(Debug)]
pub struct MemoryContext<L = AuditLogRow> {
    connection_identity: String,
    schema: SchemaMetadata,
    state: State<L>,
    transaction: Option<State<L>>,
}

impl<L> MemoryContext<L>
where
    L: AuditLog + Default + Clone,
{
    /// Creates an empty context with one table per mapped type
    pub fn new(connection_identity: impl Into<String>, schema: SchemaMetadata) -> Self {
        let tables = schema
            .entity_types
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    Table {
                        rows: Vec::new(),
                        next_identity: 1,
                    },
                )
            })
            .collect();

        let connection_identity = connection_identity.into();
        debug!(
            connection = %connection_identity,
            types = schema.entity_types.len(),
            "Memory context created"
        );

        Self {
            connection_identity,
            schema,
            state: State {
                tables,
                slots: BTreeMap::new(),
                next_entry: 1,
                pending_audit: Vec::new(),
                audit_log: Vec::new(),
            },
            transaction: None,
        }
    }

    /// Writes a row directly to a table, bypassing the change tracker
    ///
    /// Returns the key of the stored row.
    pub fn seed_row(
        &mut self,
        entity_type: &str,
        values: PropertyValues,
    ) -> Result<EntityKey, MemoryError> {
        let meta = metadata(&self.schema, entity_type)?;
        let mut row = normalize(meta, values)?;
        let table = table_mut(&mut self.state.tables, entity_type)?;
        table.assign_identity(meta, &mut row)?;

        let key = key_of(meta, &row);
        if table.position(meta, &key).is_some() {
            return Err(MemoryError::DuplicateKey {
                entity_type: entity_type.to_string(),
                key: key.to_key_string(),
            });
        }
        table.rows.push(row);
        Ok(key)
    }

    /// Tracks a new entity; it is inserted by the next save
    pub fn insert(
        &mut self,
        entity_type: &str,
        values: PropertyValues,
    ) -> Result<EntryId, MemoryError> {
        let meta = metadata(&self.schema, entity_type)?;
        let current = normalize(meta, values)?;
        Ok(self.track(entity_type, LifecycleState::Added, current))
    }

    /// Tracks the persisted row with `key`
    ///
    /// Returns the existing entry if the row is already tracked and
    /// `Ok(None)` if no such row exists.
    pub fn load(
        &mut self,
        entity_type: &str,
        key: &EntityKey,
    ) -> Result<Option<EntryId>, MemoryError> {
        let meta = metadata(&self.schema, entity_type)?;

        let tracked = self.state.slots.iter().find(|(_, slot)| {
            slot.entity_type == entity_type
                && slot.state != LifecycleState::Added
                && key_of(meta, &slot.original) == *key
        });
        if let Some((id, _)) = tracked {
            return Ok(Some(*id));
        }

        let table = table(&self.state.tables, entity_type)?;
        let row = match table.position(meta, key) {
            Some(pos) => table.rows[pos].clone(),
            None => return Ok(None),
        };
        Ok(Some(self.track(entity_type, LifecycleState::Unchanged, row)))
    }

    /// Returns copies of every persisted row of a table
    pub fn query(&self, entity_type: &str) -> Result<Vec<PropertyValues>, MemoryError> {
        Ok(table(&self.state.tables, entity_type)?.rows.clone())
    }

    /// Returns the persisted row with `key`
    pub fn row(&self, entity_type: &str, key: &EntityKey) -> Option<&PropertyValues> {
        let meta = self.schema.entity_type(entity_type)?;
        let table = self.state.tables.get(entity_type)?;
        table.position(meta, key).map(|pos| &table.rows[pos])
    }

    /// Changes a persisted value behind the tracker's back
    ///
    /// Stands in for a concurrent writer.
    pub fn update_row(
        &mut self,
        entity_type: &str,
        key: &EntityKey,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<(), MemoryError> {
        let meta = metadata(&self.schema, entity_type)?;
        check_property(meta, property)?;
        let table = table_mut(&mut self.state.tables, entity_type)?;
        let pos = table
            .position(meta, key)
            .ok_or_else(|| row_not_found(entity_type, key))?;
        table.rows[pos].set(property, value);
        Ok(())
    }

    /// Sets the current value of a tracked property
    ///
    /// A loaded entry becomes Modified while any value differs from its
    /// original, and Unchanged again once all of them match.
    pub fn set(
        &mut self,
        entry: EntryId,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<(), MemoryError> {
        let slot = self
            .state
            .slots
            .get_mut(&entry)
            .ok_or(MemoryError::UnknownEntry(entry))?;
        let meta = metadata(&self.schema, &slot.entity_type)?;
        check_property(meta, property)?;

        slot.current.set(property, value);
        if matches!(
            slot.state,
            LifecycleState::Unchanged | LifecycleState::Modified
        ) {
            slot.state = if slot.current == slot.original {
                LifecycleState::Unchanged
            } else {
                LifecycleState::Modified
            };
        }
        trace!(%entry, property, state = %slot.state, "Tracked value set");
        Ok(())
    }

    /// Marks a tracked entity for deletion
    ///
    /// An entity that was never saved is simply detached.
    pub fn remove(&mut self, entry: EntryId) -> Result<(), MemoryError> {
        let slot = self
            .state
            .slots
            .get_mut(&entry)
            .ok_or(MemoryError::UnknownEntry(entry))?;
        if slot.state == LifecycleState::Added {
            self.state.slots.remove(&entry);
        } else {
            slot.state = LifecycleState::Deleted;
        }
        Ok(())
    }

    /// Returns the lifecycle state of a tracked entry
    pub fn state_of(&self, entry: EntryId) -> Option<LifecycleState> {
        self.state.slots.get(&entry).map(|slot| slot.state)
    }

    /// Stops tracking every entity
    pub fn detach_all(&mut self) {
        self.state.slots.clear();
    }

    /// Audit rows written by successful saves, oldest first
    pub fn audit_log(&self) -> &[L] {
        &self.state.audit_log
    }

    /// Audit rows registered but not yet saved
    pub fn pending_audit(&self) -> &[L] {
        &self.state.pending_audit
    }

    /// Returns true while a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn track(
        &mut self,
        entity_type: &str,
        state: LifecycleState,
        values: PropertyValues,
    ) -> EntryId {
        let id = EntryId::new(self.state.next_entry);
        self.state.next_entry += 1;
        self.state.slots.insert(
            id,
            Slot {
                entity_type: entity_type.to_string(),
                state,
                original: values.clone(),
                current: values,
            },
        );
        trace!(entry = %id, entity_type, %state, "Entity tracked");
        id
    }

    fn slot(&self, entry: EntryId) -> Option<(&Slot, &EntityTypeMetadata)> {
        let slot = self.state.slots.get(&entry)?;
        let meta = self.schema.entity_type(&slot.entity_type)?;
        Some((slot, meta))
    }

    /// Applies pending changes to a copy of the state
    fn apply(&self) -> Result<(State<L>, u64), MemoryError> {
        let mut next = self.state.clone();
        let mut rows = 0u64;

        for slot in next.slots.values_mut() {
            let meta = metadata(&self.schema, &slot.entity_type)?;
            let table = table_mut(&mut next.tables, &slot.entity_type)?;

            match slot.state {
                LifecycleState::Added => {
                    table.assign_identity(meta, &mut slot.current)?;
                    let key = key_of(meta, &slot.current);
                    if table.position(meta, &key).is_some() {
                        return Err(MemoryError::DuplicateKey {
                            entity_type: slot.entity_type.clone(),
                            key: key.to_key_string(),
                        });
                    }
                    table.rows.push(slot.current.clone());
                }
                LifecycleState::Modified => {
                    let key = key_of(meta, &slot.original);
                    let pos = table
                        .position(meta, &key)
                        .ok_or_else(|| row_not_found(&slot.entity_type, &key))?;
                    table.rows[pos] = slot.current.clone();
                }
                LifecycleState::Deleted => {
                    let key = key_of(meta, &slot.original);
                    let pos = table
                        .position(meta, &key)
                        .ok_or_else(|| row_not_found(&slot.entity_type, &key))?;
                    table.rows.remove(pos);
                }
                LifecycleState::Unchanged => continue,
            }
            rows += 1;
        }

        next.slots
            .retain(|_, slot| slot.state != LifecycleState::Deleted);
        for slot in next.slots.values_mut() {
            slot.original = slot.current.clone();
            slot.state = LifecycleState::Unchanged;
        }

        rows += next.pending_audit.len() as u64;
        let pending = std::mem::take(&mut next.pending_audit);
        next.audit_log.extend(pending);

        Ok((next, rows))
    }
}

impl<L> ChangeTracker for MemoryContext<L>
where
    L: AuditLog + Default + Clone,
{
    fn entries(&self) -> Vec<TrackedEntry> {
        self.state
            .slots
            .iter()
            .map(|(id, slot)| TrackedEntry::new(*id, slot.entity_type.as_str(), slot.state))
            .collect()
    }

    fn current_value(&self, entry: EntryId, property: &str) -> Option<Value> {
        self.state.slots.get(&entry)?.current.get(property).cloned()
    }

    fn original_value(&self, entry: EntryId, property: &str) -> Option<Value> {
        let slot = self.state.slots.get(&entry)?;
        let values = match slot.state {
            LifecycleState::Added => &slot.current,
            _ => &slot.original,
        };
        values.get(property).cloned()
    }

    fn entity_key(&self, entry: EntryId) -> Option<EntityKey> {
        let (slot, meta) = self.slot(entry)?;
        let values = match slot.state {
            LifecycleState::Deleted => &slot.original,
            _ => &slot.current,
        };
        let key = key_of(meta, values);
        (!key.is_temporary()).then_some(key)
    }

    fn database_values(&self, entry: EntryId) -> anyhow::Result<Option<PropertyValues>> {
        let (slot, meta) = self.slot(entry).ok_or(MemoryError::UnknownEntry(entry))?;
        let key = key_of(meta, &slot.original);
        Ok(self.row(&slot.entity_type, &key).cloned())
    }
}

impl<L> PersistenceContext for MemoryContext<L>
where
    L: AuditLog + Default + Clone,
{
    fn connection_identity(&self) -> &str {
        &self.connection_identity
    }

    fn schema(&self) -> anyhow::Result<SchemaMetadata> {
        Ok(self.schema.clone())
    }

    fn begin_transaction(&mut self) -> anyhow::Result<()> {
        if self.transaction.is_some() {
            return Err(MemoryError::TransactionAlreadyActive.into());
        }
        self.transaction = Some(self.state.clone());
        debug!(connection = %self.connection_identity, "Transaction started");
        Ok(())
    }

    fn commit_transaction(&mut self) -> anyhow::Result<()> {
        self.transaction
            .take()
            .ok_or(MemoryError::NoActiveTransaction)?;
        debug!(connection = %self.connection_identity, "Transaction committed");
        Ok(())
    }

    fn rollback_transaction(&mut self) -> anyhow::Result<()> {
        let snapshot = self
            .transaction
            .take()
            .ok_or(MemoryError::NoActiveTransaction)?;
        self.state = snapshot;
        debug!(connection = %self.connection_identity, "Transaction rolled back");
        Ok(())
    }

    fn add_audit_record(&mut self, record: AuditRecord) -> anyhow::Result<()> {
        let mut row = L::default();
        record.write_to(&mut row);
        self.state.pending_audit.push(row);
        Ok(())
    }

    fn save_changes(&mut self) -> anyhow::Result<u64> {
        let (next, rows) = self.apply()?;
        let audit_rows = self.state.pending_audit.len();
        self.state = next;
        debug!(
            connection = %self.connection_identity,
            rows,
            audit_rows,
            "Changes saved"
        );
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl<L> AsyncPersistenceContext for MemoryContext<L>
where
    L: AuditLog + Default + Clone + Send,
{
    async fn save_changes_async(&mut self, cancel: CancellationToken) -> anyhow::Result<u64> {
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled.into());
        }
        tokio::task::yield_now().await;
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled.into());
        }
        self.save_changes()
    }
}

fn metadata<'a>(
    schema: &'a SchemaMetadata,
    entity_type: &str,
) -> Result<&'a EntityTypeMetadata, MemoryError> {
    schema
        .entity_type(entity_type)
        .ok_or_else(|| MemoryError::UnknownEntityType(entity_type.to_string()))
}

fn table<'a>(
    tables: &'a HashMap<String, Table>,
    entity_type: &str,
) -> Result<&'a Table, MemoryError> {
    tables
        .get(entity_type)
        .ok_or_else(|| MemoryError::UnknownEntityType(entity_type.to_string()))
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, Table>,
    entity_type: &str,
) -> Result<&'a mut Table, MemoryError> {
    tables
        .get_mut(entity_type)
        .ok_or_else(|| MemoryError::UnknownEntityType(entity_type.to_string()))
}

fn check_property(meta: &EntityTypeMetadata, property: &str) -> Result<(), MemoryError> {
    match meta.property(property) {
        Some(p) if !p.is_navigation() => Ok(()),
        _ => Err(MemoryError::UnknownProperty {
            entity_type: meta.name.clone(),
            property: property.to_string(),
        }),
    }
}

/// Reorders `values` into declaration order, filling missing scalars with null
fn normalize(
    meta: &EntityTypeMetadata,
    values: PropertyValues,
) -> Result<PropertyValues, MemoryError> {
    for name in values.names() {
        check_property(meta, name)?;
    }
    Ok(meta
        .scalar_properties()
        .map(|p| {
            let value = values.get(&p.name).cloned().unwrap_or_default();
            (p.name.clone(), value)
        })
        .collect())
}

fn key_of(meta: &EntityTypeMetadata, values: &PropertyValues) -> EntityKey {
    EntityKey::new(
        meta.key
            .iter()
            .map(|column| (column.clone(), values.get(column).cloned().unwrap_or_default()))
            .collect(),
    )
}

fn row_not_found(entity_type: &str, key: &EntityKey) -> MemoryError {
    MemoryError::RowNotFound {
        entity_type: entity_type.to_string(),
        key: key.to_key_string(),
    }
}
