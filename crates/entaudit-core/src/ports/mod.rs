//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The audit pipeline depends on these traits;
//! persistence engines implement them in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ChangeTracker`] - Read access to the live unit-of-work
//! - [`PersistenceContext`] - Transactions, saves and audit-row registration
//! - [`AsyncPersistenceContext`] - Asynchronous underlying save
//! - [`IdentityProvider`] - Who the current operator is

pub mod identity;
pub mod persistence;

pub use identity::IdentityProvider;
pub use persistence::{AsyncPersistenceContext, ChangeTracker, PersistenceContext};
