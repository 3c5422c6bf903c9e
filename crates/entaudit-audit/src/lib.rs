//! entaudit Audit - Change detection and audit logging
//!
//! Provides:
//! - `PolicyResolver` / `PolicyCache`: which entity types and properties are auditable
//! - `ChangeSetCollector`: added and modified/deleted entries of a unit-of-work
//! - `DiffEngine`: field-level changes of a modified entry
//! - `AuditRecordBuilder`: audit records from diffs and snapshots
//! - `SaveOrchestrator`: the two-phase transactional save
//! - Identity providers for the operator recorded on each audit record
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use entaudit_audit::{PolicyCache, SaveOrchestrator};
//! use entaudit_core::config::AuditSettings;
//! use entaudit_core::ports::PersistenceContext;
//!
//! fn save(ctx: &mut impl PersistenceContext, cache: Arc<PolicyCache>) -> anyhow::Result<u64> {
//!     let orchestrator = SaveOrchestrator::new(AuditSettings::default(), cache);
//!     Ok(orchestrator.save_changes(ctx)?)
//! }
//! ```

pub mod builder;
pub mod collector;
pub mod diff;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod policy;

pub use builder::AuditRecordBuilder;
pub use collector::ChangeSetCollector;
pub use diff::{CompareMode, DiffEngine};
pub use error::{AuditError, PolicyError};
pub use identity::{FixedIdentity, IdentityChain, OsIdentity};
pub use orchestrator::{SaveOrchestrator, SaveStage};
pub use policy::{AuditPolicy, IncludedPropertiesLookup, PolicyCache, PolicyResolver};
