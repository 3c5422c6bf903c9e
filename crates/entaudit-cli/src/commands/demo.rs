//! Demo command - Run the company audit scenario
//!
//! Provides the `entaudit demo` CLI command which:
//! 1. Seeds an in-memory company table
//! 2. Repeatedly modifies, deletes and adds companies, saving each round
//!    through the audited two-phase save
//! 3. Reports timing and the resulting audit trail

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use entaudit_audit::{PolicyCache, SaveOrchestrator};
use entaudit_core::config::{AuditSettings, Config, TrackingMode};
use entaudit_core::domain::{
    EntityKey, EntityTypeMetadata, EntryId, PropertyMetadata, PropertyValues, SchemaMetadata,
};
use entaudit_memory::{AuditLogRow, MemoryContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::output::{get_formatter, print_trail, OutputFormat};

const COMPANY: &str = "company";

/// Demo command arguments
#[derive(Debug, Args)]
pub struct DemoCommand {
    /// Number of save rounds
    #[arg(long, default_value = "100")]
    pub iterations: u32,

    /// Companies seeded before the first round
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(2..))]
    pub seed: u32,

    /// Override the configured tracking mode (default, all, all_except)
    #[arg(long)]
    pub tracking: Option<TrackingMode>,

    /// Compare against values read back from the table
    #[arg(long)]
    pub database_compare: bool,

    /// Record this operator instead of the OS user
    #[arg(long)]
    pub user: Option<String>,

    /// Use the asynchronous save path
    #[arg(long = "async")]
    pub use_async: bool,

    /// Maximum number of audit rows to print
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

/// Result of one scenario run
#[derive(Debug)]
pub struct DemoOutcome {
    pub iterations: u32,
    pub elapsed_ms: u128,
    pub rows: u64,
    pub cancelled: bool,
    pub companies: usize,
    pub audit_log: Vec<AuditLogRow>,
}

impl DemoCommand {
    /// Execute the demo command
    pub async fn execute(&self, format: OutputFormat, config: &Config) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let outcome = self.run(self.settings(&config.audit), cancel).await;
        ctrl_c.abort();
        let outcome = outcome?;

        if outcome.cancelled {
            formatter.warn(&format!(
                "Interrupted after {} of {} rounds",
                outcome.iterations, self.iterations
            ));
        }

        let shown = outcome.audit_log.len().saturating_sub(self.limit);
        let trail = &outcome.audit_log[shown..];

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "iterations": outcome.iterations,
                "elapsed_ms": outcome.elapsed_ms,
                "rows": outcome.rows,
                "companies": outcome.companies,
                "audit_rows": outcome.audit_log.len(),
                "trail": serde_json::to_value(trail).context("Failed to serialize audit trail")?,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "{} rounds saved in {} ms",
            outcome.iterations, outcome.elapsed_ms
        ));
        formatter.info(&format!("Rows written:  {}", outcome.rows));
        formatter.info(&format!("Companies:     {}", outcome.companies));
        formatter.info(&format!("Audit rows:    {}", outcome.audit_log.len()));

        print_trail(formatter.as_ref(), &outcome.audit_log, self.limit);

        Ok(())
    }

    /// Applies the command-line overrides to the configured settings
    fn settings(&self, configured: &AuditSettings) -> AuditSettings {
        let mut settings = configured.clone();
        if let Some(tracking) = self.tracking {
            settings.tracking = tracking;
        }
        if self.database_compare {
            settings.use_database_value_compare = true;
        }
        settings
    }

    /// Runs the scenario against a fresh in-memory database
    pub async fn run(
        &self,
        settings: AuditSettings,
        cancel: CancellationToken,
    ) -> Result<DemoOutcome> {
        let mut ctx: MemoryContext = MemoryContext::new("memory://demo", company_schema());
        for i in 0..self.seed {
            ctx.seed_row(COMPANY, new_company(&format!("company {}", i), &i.to_string()))
                .context("Failed to seed companies")?;
        }

        let orchestrator = SaveOrchestrator::new(settings, Arc::new(PolicyCache::new()));
        info!(
            iterations = self.iterations,
            seed = self.seed,
            tracking = %orchestrator.settings().tracking,
            "Starting demo"
        );

        let started = Instant::now();
        let mut rows = 0;
        let mut completed = 0;
        let mut cancelled = false;

        for round in 0..self.iterations {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let (first, second) = top_two(&mut ctx)?;
            ctx.set(second, "com_name", Uuid::new_v4().to_string())?;
            ctx.set(second, "com_phonenumber", Uuid::new_v4().to_string())?;
            ctx.remove(first)?;
            ctx.insert(COMPANY, new_company("name", "1"))?;

            let saved = match (self.use_async, self.user.as_deref()) {
                (false, None) => orchestrator.save_changes(&mut ctx),
                (false, Some(user)) => orchestrator.save_changes_as(&mut ctx, user),
                (true, None) => {
                    orchestrator
                        .save_changes_async(&mut ctx, cancel.clone())
                        .await
                }
                (true, Some(user)) => {
                    orchestrator
                        .save_changes_async_as(&mut ctx, user, cancel.clone())
                        .await
                }
            };
            match saved {
                Ok(n) => rows += n,
                Err(_) if cancel.is_cancelled() => {
                    cancelled = true;
                    break;
                }
                Err(e) => return Err(e).context(format!("Round {} failed", round + 1)),
            }

            ctx.detach_all();
            completed += 1;
            debug!(round = round + 1, rows, "Round saved");
        }

        let elapsed_ms = started.elapsed().as_millis();
        info!(completed, elapsed_ms, rows, "Demo finished");

        Ok(DemoOutcome {
            iterations: completed,
            elapsed_ms,
            rows,
            cancelled,
            companies: ctx.query(COMPANY)?.len(),
            audit_log: ctx.audit_log().to_vec(),
        })
    }
}

fn company_schema() -> SchemaMetadata {
    SchemaMetadata::new().with_entity(
        EntityTypeMetadata::new(COMPANY)
            .auditable()
            .key("com_id")
            .with_property(PropertyMetadata::scalar("com_code"))
            .with_property(PropertyMetadata::scalar("com_name"))
            .with_property(PropertyMetadata::scalar("com_address"))
            .with_property(PropertyMetadata::scalar("com_city"))
            .with_property(PropertyMetadata::scalar("com_phonenumber").not_auditable()),
    )
}

fn new_company(name: &str, phone: &str) -> PropertyValues {
    PropertyValues::new()
        .with("com_code", Uuid::new_v4().to_string())
        .with("com_name", name)
        .with("com_address", "address")
        .with("com_city", "city")
        .with("com_phonenumber", phone)
}

/// Loads the two companies with the highest codes
fn top_two(ctx: &mut MemoryContext) -> Result<(EntryId, EntryId)> {
    let mut companies = ctx.query(COMPANY)?;
    companies.sort_by_key(|row| {
        std::cmp::Reverse(
            row.get("com_code")
                .and_then(|code| code.to_audit_string())
                .unwrap_or_default(),
        )
    });

    let mut entries = Vec::with_capacity(2);
    for row in companies.iter().take(2) {
        let id = row.get("com_id").cloned().unwrap_or_default();
        let entry = ctx
            .load(COMPANY, &EntityKey::single("com_id", id))?
            .context("Company vanished while loading")?;
        entries.push(entry);
    }

    match entries[..] {
        [first, second] => Ok((first, second)),
        _ => anyhow::bail!("Need at least two companies, found {}", entries.len()),
    }
}
