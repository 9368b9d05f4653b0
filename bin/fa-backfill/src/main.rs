//! FieldAudit Backfill
//!
//! Fills `actorName`/`actorEmail` on recent audit entries that only carry
//! an `actorId`. Dry run by default; pass `--apply` to write.
//!
//! ```text
//! fa-backfill --serviceAccount ./sa.json --project field_ops --sinceDays 90 --apply
//! ```
//!
//! Logs go to stderr; the summary line is printed to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fa_audit::{ActorResolver, MongoAuditLogStore, MongoUserDirectory};
use fa_backfill::{BackfillJob, BackfillOptions, ServiceAccount, MAX_LIMIT, MAX_SINCE_DAYS};
use fa_common::logging::LogTarget;
use fa_config::ConfigLoader;

/// FieldAudit actor backfill
#[derive(Parser, Debug)]
#[command(name = "fa-backfill")]
#[command(about = "Repair audit log entries missing actor name/email")]
struct Args {
    /// Credential file (JSON with connectionUri and optional username/password/authSource)
    #[arg(long = "serviceAccount", value_name = "PATH")]
    service_account: PathBuf,

    /// Database holding audit_logs and users
    #[arg(long, value_name = "ID")]
    project: String,

    /// Lookback window in days [default: 180]
    #[arg(
        long = "sinceDays",
        value_name = "N",
        value_parser = clap::value_parser!(i64).range(1..=MAX_SINCE_DAYS)
    )]
    since_days: Option<i64>,

    /// Maximum number of entries scanned [default: 2000]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(i64).range(1..=MAX_LIMIT))]
    limit: Option<i64>,

    /// Patches per committed batch, at most 500 [default: 400]
    #[arg(long = "batchSize", value_name = "N")]
    batch_size: Option<usize>,

    /// Write patches (without this flag nothing is written)
    #[arg(long, default_value = "false")]
    apply: bool,

    /// Configuration file (defaults to the standard search paths)
    #[arg(long, env = "FIELDAUDIT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Args {
    /// Flags win over the `[backfill]` config section.
    fn options(&self, defaults: &fa_config::BackfillConfig) -> BackfillOptions {
        BackfillOptions {
            since_days: self.since_days.unwrap_or(defaults.since_days),
            limit: self.limit.unwrap_or(defaults.limit),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            apply: self.apply,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fa_common::logging::init_logging_to("fa-backfill", LogTarget::Stderr);

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::with_path(path).load(),
        None => ConfigLoader::new().load(),
    }
    .context("failed to load configuration")?;

    // Setup failures abort before any query runs
    let account = ServiceAccount::from_file(&args.service_account)?;
    let client_options = account.client_options("fa-backfill").await?;
    let client = mongodb::Client::with_options(client_options)
        .context("failed to create MongoDB client")?;

    let options = args.options(&config.backfill);
    options.validate().context("invalid backfill options")?;
    info!(
        project = %args.project,
        since_days = options.since_days,
        limit = options.limit,
        batch_size = options.effective_batch_size(),
        apply = options.apply,
        "Starting actor backfill"
    );

    let store = Arc::new(MongoAuditLogStore::new(
        client.clone(),
        &args.project,
        &config.triggers.audit_collection,
    ));
    let directory = Arc::new(MongoUserDirectory::new(
        &client,
        &args.project,
        &config.triggers.users_collection,
    ));

    let job = BackfillJob::new(store, ActorResolver::new(directory), options);
    let report = job.run().await.context("backfill run failed")?;

    println!("{}", report);
    info!("Backfill complete");
    Ok(())
}
