//! entaudit Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `Value`, `EntityKey`, `TrackedEntry`, `SchemaMetadata`, `AuditRecord`
//! - **Port definitions** - Traits for adapters: `ChangeTracker`, `PersistenceContext`,
//!   `AsyncPersistenceContext`, `IdentityProvider`
//! - **Configuration** - `AuditSettings` and the YAML-backed `Config`
//!
//! # Architecture
//!
//! The domain module holds plain data with no I/O. Ports define the trait
//! interfaces a persistence engine must implement to be audited; the audit
//! pipeline in `entaudit-audit` only ever talks to those traits.

pub mod config;
pub mod domain;
pub mod ports;
