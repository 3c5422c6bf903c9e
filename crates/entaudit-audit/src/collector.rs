//! Partitioning of the pending change set
//!
//! Added entries are collected before the first save, because that save
//! turns them into Unchanged. They are processed after it, once their
//! generated keys are visible through the tracker.

use entaudit_core::domain::{LifecycleState, TrackedEntry};
use entaudit_core::ports::ChangeTracker;
use tracing::trace;

use crate::policy::IncludedPropertiesLookup;

/// Selects the tracked entries that need auditing
pub struct ChangeSetCollector;

impl ChangeSetCollector {
    /// Returns every Added entry of an auditable type, in tracker order
    pub fn collect_added<T, L>(tracker: &T, lookup: &L) -> Vec<TrackedEntry>
    where
        T: ChangeTracker + ?Sized,
        L: IncludedPropertiesLookup + ?Sized,
    {
        Self::collect(tracker, lookup, |state| state == LifecycleState::Added)
    }

    /// Returns every Modified or Deleted entry of an auditable type, in tracker order
    pub fn collect_modified_or_deleted<T, L>(tracker: &T, lookup: &L) -> Vec<TrackedEntry>
    where
        T: ChangeTracker + ?Sized,
        L: IncludedPropertiesLookup + ?Sized,
    {
        Self::collect(tracker, lookup, |state| {
            matches!(state, LifecycleState::Modified | LifecycleState::Deleted)
        })
    }

    fn collect<T, L>(
        tracker: &T,
        lookup: &L,
        wanted: impl Fn(LifecycleState) -> bool,
    ) -> Vec<TrackedEntry>
    where
        T: ChangeTracker + ?Sized,
        L: IncludedPropertiesLookup + ?Sized,
    {
        tracker
            .entries()
            .into_iter()
            .filter(|entry| wanted(entry.state))
            .filter(|entry| {
                let auditable = lookup.is_auditable(&entry.entity_type);
                if !auditable {
                    trace!(
                        entity_type = %entry.entity_type,
                        entry = %entry.id,
                        "Skipping entry of non-auditable type"
                    );
                }
                auditable
            })
            .collect()
    }
}
