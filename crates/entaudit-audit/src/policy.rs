//! Audit policy resolution and caching
//!
//! The policy answers two questions for the rest of the pipeline: is an
//! entity type audited at all, and which of its properties, in which order.
//! It is derived once from the context's [`SchemaMetadata`] and the
//! configured [`TrackingMode`]:
//!
//! | Mode         | Included properties                                          |
//! |--------------|--------------------------------------------------------------|
//! | `All`        | every scalar property                                        |
//! | `AllExcept`  | every scalar property not marked not-auditable               |
//! | `Default`    | auditable type: as `AllExcept`; otherwise only properties    |
//! |              | marked auditable and not also marked not-auditable           |
//!
//! Navigation properties are never included. A type is auditable iff its
//! property list is non-empty.
//!
//! [`PolicyCache`] keeps one policy per connection identity for as long as
//! the cache lives. The first resolution for an identity wins: later calls
//! with a different tracking mode get the cached policy back and a warning
//! is logged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use entaudit_core::config::TrackingMode;
use entaudit_core::domain::{EntityTypeMetadata, PropertyMetadata, SchemaMetadata};
use tracing::{debug, trace, warn};

use crate::error::PolicyError;

/// Capability consulted by the pipeline to decide what is audited
///
/// [`AuditPolicy`] is the standard implementation; a custom lookup can be
/// injected into the [`SaveOrchestrator`](crate::SaveOrchestrator) instead.
pub trait IncludedPropertiesLookup: Send + Sync {
    /// Returns true if changes to `entity_type` are audited
    fn is_auditable(&self, entity_type: &str) -> bool;

    /// Returns the audited properties of `entity_type` in order
    ///
    /// Unknown types yield an empty slice.
    fn included_properties(&self, entity_type: &str) -> &[String];
}

/// Resolved, immutable audit policy for one connection identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPolicy {
    tracking: TrackingMode,
    auditable_types: HashSet<String>,
    auditable_properties: HashMap<String, Vec<String>>,
}

impl AuditPolicy {
    /// The tracking mode this policy was resolved with
    pub fn tracking(&self) -> TrackingMode {
        self.tracking
    }

    /// Every auditable entity type
    pub fn auditable_types(&self) -> &HashSet<String> {
        &self.auditable_types
    }

    /// The property list of a mapped type, empty lists included
    ///
    /// Returns `None` for types the schema does not map.
    pub fn properties_of(&self, entity_type: &str) -> Option<&[String]> {
        self.auditable_properties
            .get(entity_type)
            .map(Vec::as_slice)
    }
}

impl IncludedPropertiesLookup for AuditPolicy {
    fn is_auditable(&self, entity_type: &str) -> bool {
        self.auditable_types.contains(entity_type)
    }

    fn included_properties(&self, entity_type: &str) -> &[String] {
        self.properties_of(entity_type).unwrap_or(&[])
    }
}

/// Derives an [`AuditPolicy`] from schema metadata
pub struct PolicyResolver;

impl PolicyResolver {
    /// Resolves the policy for every mapped type of `schema`
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::DuplicateEntityType`] if a type is mapped twice
    /// and [`PolicyError::InvalidMetadata`] if a type's key is inconsistent.
    pub fn resolve(
        schema: &SchemaMetadata,
        tracking: TrackingMode,
    ) -> Result<AuditPolicy, PolicyError> {
        let mut auditable_types = HashSet::new();
        let mut auditable_properties = HashMap::new();

        for entity_type in &schema.entity_types {
            entity_type.validate()?;
            if auditable_properties.contains_key(&entity_type.name) {
                return Err(PolicyError::DuplicateEntityType(entity_type.name.clone()));
            }

            let included = Self::included_properties(entity_type, tracking);
            trace!(
                entity_type = %entity_type.name,
                properties = included.len(),
                "Resolved auditable properties"
            );
            if !included.is_empty() {
                auditable_types.insert(entity_type.name.clone());
            }
            auditable_properties.insert(entity_type.name.clone(), included);
        }

        debug!(
            %tracking,
            mapped = auditable_properties.len(),
            auditable = auditable_types.len(),
            "Audit policy resolved"
        );

        Ok(AuditPolicy {
            tracking,
            auditable_types,
            auditable_properties,
        })
    }

    fn included_properties(
        entity_type: &EntityTypeMetadata,
        tracking: TrackingMode,
    ) -> Vec<String> {
        let include = |p: &PropertyMetadata| match tracking {
            TrackingMode::All => true,
            TrackingMode::AllExcept => !p.not_auditable,
            TrackingMode::Default if entity_type.auditable => !p.not_auditable,
            TrackingMode::Default => p.auditable && !p.not_auditable,
        };

        entity_type
            .scalar_properties()
            .filter(|p| include(p))
            .map(|p| p.name.clone())
            .collect()
    }
}

/// Shared cache of resolved policies keyed by connection identity
///
/// Create one cache at application start and hand an `Arc` of it to every
/// orchestrator. Entries are immutable once inserted.
#[derive(Debug, Default)]
pub struct PolicyCache {
    policies: DashMap<String, Arc<AuditPolicy>>,
}

impl PolicyCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the policy for `connection_identity`, resolving it on first use
    ///
    /// `load_schema` is only called when no policy is cached for the
    /// identity. Concurrent first calls for the same identity resolve the
    /// policy exactly once; the others wait for and share the result.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::MetadataUnavailable`] if `load_schema` fails,
    /// or any error of [`PolicyResolver::resolve`]. Failures are not cached.
    pub fn resolve<F>(
        &self,
        connection_identity: &str,
        tracking: TrackingMode,
        load_schema: F,
    ) -> Result<Arc<AuditPolicy>, PolicyError>
    where
        F: FnOnce() -> anyhow::Result<SchemaMetadata>,
    {
        let cached = self
            .policies
            .get(connection_identity)
            .map(|entry| Arc::clone(entry.value()));

        let policy = match cached {
            Some(policy) => policy,
            None => {
                let entry = self
                    .policies
                    .entry(connection_identity.to_string())
                    .or_try_insert_with(|| {
                        let schema = load_schema().map_err(PolicyError::MetadataUnavailable)?;
                        PolicyResolver::resolve(&schema, tracking).map(Arc::new)
                    })?;
                Arc::clone(entry.value())
            }
        };

        if policy.tracking() != tracking {
            warn!(
                connection = %connection_identity,
                cached = %policy.tracking(),
                requested = %tracking,
                "Reusing audit policy resolved with a different tracking mode"
            );
        }

        Ok(policy)
    }

    /// Returns the cached policy for `connection_identity`, if any
    pub fn get(&self, connection_identity: &str) -> Option<Arc<AuditPolicy>> {
        self.policies
            .get(connection_identity)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drops the cached policy so that the next save resolves it again
    pub fn invalidate(&self, connection_identity: &str) -> bool {
        self.policies.remove(connection_identity).is_some()
    }

    /// Number of cached policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Company is marked auditable with one excluded property; Employee is
    /// unmarked with a single auditable property; Tag has no markers at all.
    fn schema() -> SchemaMetadata {
        SchemaMetadata::new()
            .with_entity(
                EntityTypeMetadata::new("Company")
                    .auditable()
                    .key("id")
                    .with_property(PropertyMetadata::scalar("name"))
                    .with_property(PropertyMetadata::scalar("phone").not_auditable())
                    .with_property(PropertyMetadata::scalar("city"))
                    .with_property(PropertyMetadata::navigation("employees")),
            )
            .with_entity(
                EntityTypeMetadata::new("Employee")
                    .key("id")
                    .with_property(PropertyMetadata::scalar("salary").auditable())
                    .with_property(PropertyMetadata::scalar("badge").auditable().not_auditable())
                    .with_property(PropertyMetadata::scalar("nickname"))
                    .with_property(PropertyMetadata::navigation("company").auditable()),
            )
            .with_entity(
                EntityTypeMetadata::new("Tag")
                    .key("id")
                    .with_property(PropertyMetadata::scalar("label")),
            )
    }

    fn props<'a>(policy: &'a AuditPolicy, ty: &str) -> Vec<&'a str> {
        policy
            .included_properties(ty)
            .iter()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn test_default_mode() {
        let policy = PolicyResolver::resolve(&schema(), TrackingMode::Default).unwrap();

        assert_eq!(props(&policy, "Company"), vec!["id", "name", "city"]);
        assert_eq!(props(&policy, "Employee"), vec!["salary"]);
        assert!(props(&policy, "Tag").is_empty());

        assert!(policy.is_auditable("Company"));
        assert!(policy.is_auditable("Employee"));
        assert!(!policy.is_auditable("Tag"));
        assert_eq!(policy.properties_of("Tag"), Some(&[][..]));
    }

    #[test]
    fn test_all_mode_ignores_markers() {
        let policy = PolicyResolver::resolve(&schema(), TrackingMode::All).unwrap();

        assert_eq!(props(&policy, "Company"), vec!["id", "name", "phone", "city"]);
        assert_eq!(
            props(&policy, "Employee"),
            vec!["id", "salary", "badge", "nickname"]
        );
        assert_eq!(props(&policy, "Tag"), vec!["id", "label"]);
        assert_eq!(policy.auditable_types().len(), 3);
    }

    #[test]
    fn test_all_except_mode_honours_not_auditable() {
        let policy = PolicyResolver::resolve(&schema(), TrackingMode::AllExcept).unwrap();

        assert_eq!(props(&policy, "Company"), vec!["id", "name", "city"]);
        assert_eq!(props(&policy, "Employee"), vec!["id", "salary", "nickname"]);
        assert_eq!(props(&policy, "Tag"), vec!["id", "label"]);
    }

    #[test]
    fn test_navigation_properties_never_included() {
        for mode in [TrackingMode::Default, TrackingMode::All, TrackingMode::AllExcept] {
            let policy = PolicyResolver::resolve(&schema(), mode).unwrap();
            assert!(!props(&policy, "Company").contains(&"employees"));
            assert!(!props(&policy, "Employee").contains(&"company"));
        }
    }

    #[test]
    fn test_auditable_iff_non_empty() {
        for mode in [TrackingMode::Default, TrackingMode::All, TrackingMode::AllExcept] {
            let policy = PolicyResolver::resolve(&schema(), mode).unwrap();
            for ty in ["Company", "Employee", "Tag"] {
                assert_eq!(
                    policy.is_auditable(ty),
                    !policy.included_properties(ty).is_empty()
                );
            }
        }
    }

    #[test]
    fn test_unknown_type_is_not_auditable() {
        let policy = PolicyResolver::resolve(&schema(), TrackingMode::All).unwrap();
        assert!(!policy.is_auditable("Invoice"));
        assert!(policy.included_properties("Invoice").is_empty());
        assert!(policy.properties_of("Invoice").is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let schema = schema().with_entity(EntityTypeMetadata::new("Tag").key("id"));
        let result = PolicyResolver::resolve(&schema, TrackingMode::Default);
        assert!(matches!(result, Err(PolicyError::DuplicateEntityType(t)) if t == "Tag"));
    }

    #[test]
    fn test_type_without_key_rejected() {
        let schema = SchemaMetadata::new().with_entity(
            EntityTypeMetadata::new("Loose").with_property(PropertyMetadata::scalar("x")),
        );
        let result = PolicyResolver::resolve(&schema, TrackingMode::All);
        assert!(matches!(result, Err(PolicyError::InvalidMetadata(_))));
    }

    #[test]
    fn test_cache_reads_metadata_once() {
        let cache = PolicyCache::new();
        let reads = AtomicUsize::new(0);
        let load = || {
            reads.fetch_add(1, Ordering::SeqCst);
            Ok(schema())
        };

        let first = cache.resolve("db-a", TrackingMode::Default, load).unwrap();
        let second = cache
            .resolve("db-a", TrackingMode::Default, || {
                reads.fetch_add(1, Ordering::SeqCst);
                Ok(schema())
            })
            .unwrap();

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_cache_first_writer_wins_across_modes() {
        let cache = PolicyCache::new();
        let first = cache
            .resolve("db-a", TrackingMode::Default, || Ok(schema()))
            .unwrap();
        let second = cache
            .resolve("db-a", TrackingMode::All, || panic!("metadata must not be re-read"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.tracking(), TrackingMode::Default);
    }

    #[test]
    fn test_cache_keys_by_connection_identity() {
        let cache = PolicyCache::new();
        let a = cache
            .resolve("db-a", TrackingMode::Default, || Ok(schema()))
            .unwrap();
        let b = cache
            .resolve("db-b", TrackingMode::All, || Ok(schema()))
            .unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        assert_eq!(b.tracking(), TrackingMode::All);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let cache = PolicyCache::new();
        let result = cache.resolve("db-a", TrackingMode::Default, || {
            Err(anyhow::anyhow!("metadata workspace not loaded"))
        });
        assert!(matches!(result, Err(PolicyError::MetadataUnavailable(_))));
        assert!(cache.is_empty());

        let policy = cache
            .resolve("db-a", TrackingMode::Default, || Ok(schema()))
            .unwrap();
        assert!(policy.is_auditable("Company"));
    }

    #[test]
    fn test_invalidate_forces_new_resolution() {
        let cache = PolicyCache::new();
        cache
            .resolve("db-a", TrackingMode::Default, || Ok(schema()))
            .unwrap();
        assert!(cache.invalidate("db-a"));
        assert!(cache.get("db-a").is_none());

        let policy = cache
            .resolve("db-a", TrackingMode::All, || Ok(schema()))
            .unwrap();
        assert_eq!(policy.tracking(), TrackingMode::All);
        assert!(!cache.invalidate("db-missing"));
    }

    #[test]
    fn test_concurrent_first_access_resolves_once() {
        let cache = PolicyCache::new();
        let reads = AtomicUsize::new(0);

        let policies: Vec<Arc<AuditPolicy>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        cache
                            .resolve("db-shared", TrackingMode::Default, || {
                                reads.fetch_add(1, Ordering::SeqCst);
                                Ok(schema())
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(policies.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
