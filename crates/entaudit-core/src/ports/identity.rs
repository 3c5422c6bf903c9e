//! Operator identity port
//!
//! Audit records name the operator responsible for a change. Rather than
//! reading ambient process state, the audit pipeline asks an injected
//! [`IdentityProvider`]; concrete providers live in `entaudit-audit`.

/// Resolves the name of the current operator
pub trait IdentityProvider: Send + Sync {
    /// Returns the operator name, or `None` if this provider cannot tell
    fn current_user(&self) -> Option<String>;
}
