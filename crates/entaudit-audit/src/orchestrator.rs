//! Two-phase audited save
//!
//! Added entities have no generated key until the underlying save has run,
//! so one audited save performs two underlying saves inside a single
//! transaction:
//!
//! ```text
//! Idle -> TransactionOpen -> AddedCollected -> PreSaveApplied -> FirstSaveDone
//!      -> PostSaveApplied -> SecondSaveDone -> Committed
//! ```
//!
//! Audit records for modified and deleted entities are registered before the
//! first save. Records for added entities are registered after it, once
//! their keys can be read, and written by the second save. Any failure after
//! the transaction was opened rolls it back and the error is returned as is.

use std::fmt;
use std::sync::Arc;

use entaudit_core::config::AuditSettings;
use entaudit_core::domain::{LifecycleState, LogOperation, TrackedEntry};
use entaudit_core::ports::{AsyncPersistenceContext, IdentityProvider, PersistenceContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::builder::AuditRecordBuilder;
use crate::collector::ChangeSetCollector;
use crate::diff::{CompareMode, DiffEngine};
use crate::error::AuditError;
use crate::identity::IdentityChain;
use crate::policy::{IncludedPropertiesLookup, PolicyCache};

/// Progress of one audited save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    /// Nothing has touched the context yet
    Idle,
    /// The transaction is open
    TransactionOpen,
    /// Added entries have been collected
    AddedCollected,
    /// Records for modified and deleted entries are registered
    PreSaveApplied,
    /// The first underlying save succeeded
    FirstSaveDone,
    /// Records for added entries are registered
    PostSaveApplied,
    /// The second underlying save succeeded
    SecondSaveDone,
    /// The transaction is committed
    Committed,
    /// The save failed and was rolled back
    Failed,
}

impl SaveStage {
    /// Returns true if a transaction may be open in this stage
    pub fn in_transaction(&self) -> bool {
        !matches!(
            self,
            SaveStage::Idle | SaveStage::Committed | SaveStage::Failed
        )
    }
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveStage::Idle => "idle",
            SaveStage::TransactionOpen => "transaction_open",
            SaveStage::AddedCollected => "added_collected",
            SaveStage::PreSaveApplied => "pre_save_applied",
            SaveStage::FirstSaveDone => "first_save_done",
            SaveStage::PostSaveApplied => "post_save_applied",
            SaveStage::SecondSaveDone => "second_save_done",
            SaveStage::Committed => "committed",
            SaveStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Saves a persistence context and its audit records atomically
///
/// # Example
///
/// ```ignore
/// let cache = Arc::new(PolicyCache::new());
/// let orchestrator = SaveOrchestrator::new(AuditSettings::default(), cache)
///     .with_identity(Arc::new(FixedIdentity::new("alice")));
/// let rows = orchestrator.save_changes(&mut ctx)?;
/// ```
pub struct SaveOrchestrator {
    settings: AuditSettings,
    cache: Arc<PolicyCache>,
    identity: IdentityChain,
    lookup: Option<Arc<dyn IncludedPropertiesLookup>>,
}

impl SaveOrchestrator {
    /// Creates an orchestrator resolving policies through `cache`
    ///
    /// The operator defaults to the OS user the process runs as.
    pub fn new(settings: AuditSettings, cache: Arc<PolicyCache>) -> Self {
        Self {
            settings,
            cache,
            identity: IdentityChain::principal_then_os(None),
            lookup: None,
        }
    }

    /// Replaces the operator identity provider
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = IdentityChain::new().with(identity);
        self
    }

    /// Uses `lookup` instead of the policy resolved from the context's schema
    pub fn with_lookup(mut self, lookup: Arc<dyn IncludedPropertiesLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Returns the audit settings
    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Saves `ctx`, attributing changes to the configured operator
    ///
    /// Returns the total number of rows written by the underlying saves.
    pub fn save_changes<C>(&self, ctx: &mut C) -> Result<u64, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        self.save(ctx, None)
    }

    /// Saves `ctx`, attributing changes to `user`
    pub fn save_changes_as<C>(&self, ctx: &mut C, user: &str) -> Result<u64, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        self.save(ctx, Some(user))
    }

    /// Asynchronous counterpart of [`SaveOrchestrator::save_changes`]
    pub async fn save_changes_async<C>(
        &self,
        ctx: &mut C,
        cancel: CancellationToken,
    ) -> Result<u64, AuditError>
    where
        C: AsyncPersistenceContext + ?Sized,
    {
        self.save_async(ctx, None, cancel).await
    }

    /// Asynchronous counterpart of [`SaveOrchestrator::save_changes_as`]
    pub async fn save_changes_async_as<C>(
        &self,
        ctx: &mut C,
        user: &str,
        cancel: CancellationToken,
    ) -> Result<u64, AuditError>
    where
        C: AsyncPersistenceContext + ?Sized,
    {
        self.save_async(ctx, Some(user), cancel).await
    }

    fn save<C>(&self, ctx: &mut C, user: Option<&str>) -> Result<u64, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        if !self.settings.enabled {
            debug!(
                connection = %ctx.connection_identity(),
                "Auditing disabled, saving directly"
            );
            return ctx.save_changes().map_err(AuditError::UnderlyingSave);
        }

        let mut stage = SaveStage::Idle;
        match self.run(ctx, user, &mut stage) {
            Ok(rows) => Ok(rows),
            Err(err) => Err(Self::fail(ctx, stage, err)),
        }
    }

    async fn save_async<C>(
        &self,
        ctx: &mut C,
        user: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<u64, AuditError>
    where
        C: AsyncPersistenceContext + ?Sized,
    {
        if !self.settings.enabled {
            debug!(
                connection = %ctx.connection_identity(),
                "Auditing disabled, saving directly"
            );
            return ctx
                .save_changes_async(cancel)
                .await
                .map_err(AuditError::UnderlyingSave);
        }

        let mut stage = SaveStage::Idle;
        match self.run_async(ctx, user, cancel, &mut stage).await {
            Ok(rows) => Ok(rows),
            Err(err) => Err(Self::fail(ctx, stage, err)),
        }
    }

    fn run<C>(
        &self,
        ctx: &mut C,
        user: Option<&str>,
        stage: &mut SaveStage,
    ) -> Result<u64, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        let lookup = self.resolve_lookup(ctx)?;
        let user = self.operator(user);

        self.begin(ctx, stage)?;
        let added = self.prepare(ctx, lookup.as_ref(), &user, stage)?;

        let first = ctx.save_changes().map_err(AuditError::UnderlyingSave)?;
        advance(&*ctx, stage, SaveStage::FirstSaveDone);

        self.audit_added(ctx, lookup.as_ref(), &added, &user, stage)?;

        let second = ctx.save_changes().map_err(AuditError::UnderlyingSave)?;
        advance(&*ctx, stage, SaveStage::SecondSaveDone);

        Self::commit(ctx, stage)?;
        Ok(first + second)
    }

    async fn run_async<C>(
        &self,
        ctx: &mut C,
        user: Option<&str>,
        cancel: CancellationToken,
        stage: &mut SaveStage,
    ) -> Result<u64, AuditError>
    where
        C: AsyncPersistenceContext + ?Sized,
    {
        let lookup = self.resolve_lookup(ctx)?;
        let user = self.operator(user);

        self.begin(ctx, stage)?;
        let added = self.prepare(ctx, lookup.as_ref(), &user, stage)?;

        let first = ctx
            .save_changes_async(cancel.clone())
            .await
            .map_err(AuditError::UnderlyingSave)?;
        advance(&*ctx, stage, SaveStage::FirstSaveDone);

        self.audit_added(ctx, lookup.as_ref(), &added, &user, stage)?;

        let second = ctx
            .save_changes_async(cancel)
            .await
            .map_err(AuditError::UnderlyingSave)?;
        advance(&*ctx, stage, SaveStage::SecondSaveDone);

        Self::commit(ctx, stage)?;
        Ok(first + second)
    }

    fn resolve_lookup<C>(&self, ctx: &C) -> Result<Arc<dyn IncludedPropertiesLookup>, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        if let Some(lookup) = &self.lookup {
            return Ok(Arc::clone(lookup));
        }
        let policy: Arc<dyn IncludedPropertiesLookup> =
            self.cache
                .resolve(ctx.connection_identity(), self.settings.tracking, || {
                    ctx.schema()
                })?;
        Ok(policy)
    }

    fn operator(&self, explicit: Option<&str>) -> String {
        match explicit {
            Some(user) => user.to_string(),
            None => self.identity.resolve(),
        }
    }

    fn begin<C>(&self, ctx: &mut C, stage: &mut SaveStage) -> Result<(), AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        ctx.begin_transaction().map_err(AuditError::Transaction)?;
        advance(&*ctx, stage, SaveStage::TransactionOpen);
        Ok(())
    }

    /// Collects added entries, then audits modified and deleted ones
    fn prepare<C>(
        &self,
        ctx: &mut C,
        lookup: &dyn IncludedPropertiesLookup,
        user: &str,
        stage: &mut SaveStage,
    ) -> Result<Vec<TrackedEntry>, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        let added = ChangeSetCollector::collect_added(&*ctx, lookup);
        advance(&*ctx, stage, SaveStage::AddedCollected);

        let pending = ChangeSetCollector::collect_modified_or_deleted(&*ctx, lookup);
        let records = self.audit_entries(ctx, lookup, &pending, user)?;
        debug!(
            connection = %ctx.connection_identity(),
            entries = pending.len(),
            records,
            "Registered audit records for modified and deleted entries"
        );
        advance(&*ctx, stage, SaveStage::PreSaveApplied);

        Ok(added)
    }

    fn audit_added<C>(
        &self,
        ctx: &mut C,
        lookup: &dyn IncludedPropertiesLookup,
        added: &[TrackedEntry],
        user: &str,
        stage: &mut SaveStage,
    ) -> Result<(), AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        let records = self.audit_entries(ctx, lookup, added, user)?;
        debug!(
            connection = %ctx.connection_identity(),
            entries = added.len(),
            records,
            "Registered audit records for added entries"
        );
        advance(&*ctx, stage, SaveStage::PostSaveApplied);
        Ok(())
    }

    fn audit_entries<C>(
        &self,
        ctx: &mut C,
        lookup: &dyn IncludedPropertiesLookup,
        entries: &[TrackedEntry],
        user: &str,
    ) -> Result<usize, AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        let mode = CompareMode::from_database_compare(self.settings.use_database_value_compare);
        let mut registered = 0;

        for entry in entries {
            let included = lookup.included_properties(&entry.entity_type);
            let (operation, diff) = match entry.state {
                LifecycleState::Added => (LogOperation::Create, Vec::new()),
                LifecycleState::Deleted => (LogOperation::Delete, Vec::new()),
                LifecycleState::Modified => (
                    LogOperation::Update,
                    DiffEngine::diff(&*ctx, entry, included, mode)?,
                ),
                LifecycleState::Unchanged => continue,
            };

            let records =
                AuditRecordBuilder::build(&*ctx, entry, operation, included, &diff, user)?;
            for record in records {
                ctx.add_audit_record(record).map_err(AuditError::Sink)?;
                registered += 1;
            }
        }

        Ok(registered)
    }

    fn commit<C>(ctx: &mut C, stage: &mut SaveStage) -> Result<(), AuditError>
    where
        C: PersistenceContext + ?Sized,
    {
        ctx.commit_transaction().map_err(AuditError::Transaction)?;
        advance(&*ctx, stage, SaveStage::Committed);
        Ok(())
    }

    fn fail<C>(ctx: &mut C, stage: SaveStage, err: AuditError) -> AuditError
    where
        C: PersistenceContext + ?Sized,
    {
        error!(
            connection = %ctx.connection_identity(),
            %stage,
            error = %err,
            "Audited save failed"
        );

        if stage.in_transaction() {
            match ctx.rollback_transaction() {
                Ok(()) => debug!(
                    connection = %ctx.connection_identity(),
                    stage = %SaveStage::Failed,
                    "Transaction rolled back"
                ),
                Err(rollback) => warn!(
                    connection = %ctx.connection_identity(),
                    error = %rollback,
                    "Rollback failed"
                ),
            }
        }

        err
    }
}

fn advance<C>(ctx: &C, stage: &mut SaveStage, next: SaveStage)
where
    C: PersistenceContext + ?Sized,
{
    debug!(
        connection = %ctx.connection_identity(),
        from = %stage,
        stage = %next,
        "Save stage"
    );
    *stage = next;
}

impl fmt::Debug for SaveOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOrchestrator")
            .field("settings", &self.settings)
            .field("cached_policies", &self.cache.len())
            .field("custom_lookup", &self.lookup.is_some())
            .finish()
    }
}
