//! Operator identity providers

use std::sync::Arc;

use entaudit_core::ports::IdentityProvider;

/// Always reports the same operator, e.g. the authenticated principal of a request
#[derive(Debug, Clone)]
pub struct FixedIdentity(String);

impl FixedIdentity {
    /// Creates a provider that always reports `user`
    pub fn new(user: impl Into<String>) -> Self {
        Self(user.into())
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_user(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reports the user the process runs as
///
/// Reads `USER`, falling back to `USERNAME` on platforms that set that instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsIdentity;

impl IdentityProvider for OsIdentity {
    fn current_user(&self) -> Option<String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
    }
}

/// Asks each provider in turn and returns the first non-empty answer
///
/// Resolves to the empty string when no provider knows the operator, which
/// is what [`IdentityChain::resolve`] returns and what is stored in the
/// audit record.
#[derive(Clone, Default)]
pub struct IdentityChain {
    providers: Vec<Arc<dyn IdentityProvider>>,
}

impl IdentityChain {
    /// Creates an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Principal first, then the OS user
    pub fn principal_then_os(principal: Option<Arc<dyn IdentityProvider>>) -> Self {
        let mut chain = Self::new();
        if let Some(principal) = principal {
            chain = chain.with(principal);
        }
        chain.with(Arc::new(OsIdentity))
    }

    /// Appends a provider
    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// The operator name, or `""` if no provider knows it
    pub fn resolve(&self) -> String {
        self.current_user().unwrap_or_default()
    }
}

impl IdentityProvider for IdentityChain {
    fn current_user(&self) -> Option<String> {
        self.providers
            .iter()
            .filter_map(|p| p.current_user())
            .find(|user| !user.is_empty())
    }
}

impl std::fmt::Debug for IdentityChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityChain")
            .field("providers", &self.providers.len())
            .finish()
    }
}
