//! Tracked entries and entity keys
//!
//! A [`TrackedEntry`] is a lightweight handle to an object managed by a
//! unit-of-work. It carries the entry's identity within the tracker, its
//! entity type name and its lifecycle state at the time it was enumerated.
//! Property values are always read back through the
//! [`ChangeTracker`](crate::ports::ChangeTracker) port, so a handle taken
//! before a save observes keys generated by that save.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::value::Value;

/// Separator placed between `name=value` pairs of a composite key
pub const KEY_SEPARATOR: char = '►';

/// Identity of an entry within one change tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    /// Create an EntryId from a raw tracker slot number
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw slot number
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a tracked entry within the unit-of-work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Newly attached, will be inserted on save
    Added,
    /// Loaded and changed, will be updated on save
    Modified,
    /// Marked for removal, will be deleted on save
    Deleted,
    /// Loaded and not changed
    Unchanged,
}

impl LifecycleState {
    /// Returns the state name used in logs and storage
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Added => "added",
            LifecycleState::Modified => "modified",
            LifecycleState::Deleted => "deleted",
            LifecycleState::Unchanged => "unchanged",
        }
    }

    /// Returns true for the states that produce writes on save
    pub fn is_pending(&self) -> bool {
        !matches!(self, LifecycleState::Unchanged)
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(LifecycleState::Added),
            "modified" => Ok(LifecycleState::Modified),
            "deleted" => Ok(LifecycleState::Deleted),
            "unchanged" => Ok(LifecycleState::Unchanged),
            other => Err(DomainError::UnknownLifecycleState(other.to_string())),
        }
    }
}

/// Handle to an object managed by a unit-of-work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    /// Identity within the tracker
    pub id: EntryId,
    /// Mapped entity type name
    pub entity_type: String,
    /// State at enumeration time
    pub state: LifecycleState,
}

impl TrackedEntry {
    /// Creates a new entry handle
    pub fn new(id: EntryId, entity_type: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            state,
        }
    }
}

/// Primary key values of one entity, in key-declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityKey(Vec<(String, Value)>);

impl EntityKey {
    /// Creates a key from ordered `(column, value)` pairs
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self(columns)
    }

    /// Creates a single-column key
    pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(vec![(column.into(), value.into())])
    }

    /// Builder-style append of another key column
    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((column.into(), value.into()));
        self
    }

    /// Iterates over `(column, value)` pairs
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Number of key columns
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no columns
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if any key column is still unassigned
    pub fn is_temporary(&self) -> bool {
        self.0.iter().any(|(_, v)| v.is_null())
    }

    /// Serializes the key for the `entity_id` column of an audit record
    ///
    /// A single-column key is written as its bare value. A composite key is
    /// written as `name=value` pairs joined by [`KEY_SEPARATOR`].
    ///
    /// ```
    /// use entaudit_core::domain::EntityKey;
    ///
    /// assert_eq!(EntityKey::single("id", 5i64).to_key_string(), "5");
    /// assert_eq!(
    ///     EntityKey::single("a", "1").and("b", "2").to_key_string(),
    ///     "a=1►b=2"
    /// );
    /// ```
    pub fn to_key_string(&self) -> String {
        match self.0.as_slice() {
            [(_, value)] => value.to_string(),
            columns => {
                let mut out = String::new();
                for (i, (name, value)) in columns.iter().enumerate() {
                    if i > 0 {
                        out.push(KEY_SEPARATOR);
                    }
                    out.push_str(name);
                    out.push('=');
                    out.push_str(&value.to_string());
                }
                out
            }
        }
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column_key_is_bare_value() {
        let key = EntityKey::single("id", "5");
        assert_eq!(key.to_key_string(), "5");
    }

    #[test]
    fn test_composite_key_uses_separator_in_declaration_order() {
        let key = EntityKey::single("a", "1").and("b", "2");
        assert_eq!(key.to_key_string(), "a=1►b=2");

        let reversed = EntityKey::single("b", "2").and("a", "1");
        assert_eq!(reversed.to_key_string(), "b=2►a=1");
    }

    #[test]
    fn test_three_column_key() {
        let key = EntityKey::single("tenant", 7i64)
            .and("year", 2024i64)
            .and("seq", 12i64);
        assert_eq!(key.to_key_string(), "tenant=7►year=2024►seq=12");
        assert_eq!(key.len(), 3);
    }

    #[test]
    fn test_temporary_key_detection() {
        assert!(EntityKey::single("id", Value::Null).is_temporary());
        assert!(!EntityKey::single("id", 1i64).is_temporary());
    }

    #[test]
    fn test_lifecycle_state_round_trip() {
        for state in [
            LifecycleState::Added,
            LifecycleState::Modified,
            LifecycleState::Deleted,
            LifecycleState::Unchanged,
        ] {
            assert_eq!(state.name().parse::<LifecycleState>().unwrap(), state);
        }
        assert!("detached".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn test_only_unchanged_is_not_pending() {
        assert!(LifecycleState::Added.is_pending());
        assert!(LifecycleState::Deleted.is_pending());
        assert!(!LifecycleState::Unchanged.is_pending());
    }
}
