//! Command implementations for the resync daemon.
//!
//! Handles:
//! - run: one reconciliation, report printed, outcome mapped to an exit code
//! - start: cron-scheduled reconciliation until SIGINT/SIGTERM
//! - status: index and system-of-record counts
//! - show-config: effective configuration

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use resync_reconcile::{
    ReconcileError, ReconciliationJob, ReconciliationReport, RunOutcome, TantivyIndexStore,
    RESYNC_JOB_NAME,
};
use resync_scheduler::{register_resync_job, SchedulerConfig, SchedulerService};
use resync_search::{SearchIndex, SearchIndexConfig, SearchIndexer};
use resync_storage::Storage;
use resync_types::{EntryStatus, Settings};

use crate::cli::RunOverrides;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_HARD_FAILURE: i32 = 1;
pub const EXIT_PARTIAL_FAILURE: i32 = 2;
pub const EXIT_ALREADY_RUNNING: i32 = 3;

/// Flags that apply to every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOverrides {
    pub config_path: Option<String>,
    pub log_level: Option<String>,
    pub db_path: Option<String>,
    pub index_path: Option<String>,
}

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(globals: &GlobalOverrides) -> Result<Settings> {
    let mut settings =
        Settings::load(globals.config_path.as_deref()).context("Failed to load configuration")?;

    if let Some(log_level) = &globals.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(db_path) = &globals.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(index_path) = &globals.index_path {
        settings.index_path = index_path.clone();
    }

    Ok(settings)
}

pub fn apply_run_overrides(settings: &mut Settings, run: &RunOverrides) {
    let reconcile = &mut settings.reconcile;
    if run.dry_run {
        reconcile.dry_run = true;
    }
    if let Some(batch_size) = run.batch_size {
        reconcile.batch_size = batch_size;
    }
    if let Some(ms) = run.time_until_reindex_ms {
        reconcile.time_until_reindex_ms = ms;
    }
    if let Some(workers) = run.concurrency {
        reconcile.concurrency = workers;
    }
    if run.skip_confirmed_orphans {
        reconcile.purge_confirmed_orphans = false;
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// The opened system of record and search index.
pub struct ResyncStack {
    pub storage: Arc<Storage>,
    pub index: SearchIndex,
    pub index_store: Arc<TantivyIndexStore>,
}

impl ResyncStack {
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        info!("Opening storage at {:?}", db_path);
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open storage")?);

        let index_path = settings.expanded_index_path();
        info!("Opening search index at {:?}", index_path);
        let index = SearchIndex::open_or_create(SearchIndexConfig::new(&index_path))
            .context("Failed to open search index")?;
        let indexer = Arc::new(SearchIndexer::new(&index).context("Failed to open index writer")?);
        let index_store = Arc::new(
            TantivyIndexStore::new(&index, indexer).context("Failed to open index reader")?,
        );

        Ok(Self {
            storage,
            index,
            index_store,
        })
    }

    pub fn job(&self, settings: &Settings) -> Result<ReconciliationJob, ReconcileError> {
        ReconciliationJob::new(
            settings.reconcile.clone(),
            self.index_store.clone(),
            self.storage.clone(),
            self.storage.clone(),
        )
    }
}

/// Exit status for a `run` result.
pub fn exit_code(result: &Result<ReconciliationReport, ReconcileError>) -> i32 {
    match result {
        Ok(report) => match report.outcome() {
            RunOutcome::Success => EXIT_SUCCESS,
            RunOutcome::PartialFailure => EXIT_PARTIAL_FAILURE,
            RunOutcome::HardFailure => EXIT_HARD_FAILURE,
        },
        Err(ReconcileError::AlreadyRunning { .. }) => EXIT_ALREADY_RUNNING,
        Err(_) => EXIT_HARD_FAILURE,
    }
}

/// Human-readable report.
pub fn format_report(report: &ReconciliationReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    out.push_str(&format!("Reconciliation run {}{}\n", report.run_id, mode));
    out.push_str(&format!("  Outcome:            {}\n", report.outcome().as_str()));
    out.push_str(&format!(
        "  Scanned:            {} in {} pages\n",
        report.scanned, report.pages
    ));
    out.push_str(&format!("  Promoted:           {}\n", report.promoted));
    out.push_str(&format!(
        "  Purged:             {} provisional, {} confirmed\n",
        report.purged_provisional, report.purged_confirmed
    ));
    out.push_str(&format!("  Skipped (fresh):    {}\n", report.skipped_fresh));
    out.push_str(&format!("  Already resolved:   {}\n", report.already_resolved));
    out.push_str(&format!("  Verified:           {}\n", report.verified));
    out.push_str(&format!("  Errors:             {}\n", report.errors));
    if report.cancelled {
        out.push_str("  Cancelled before completion\n");
    }
    if report.lease_lost {
        out.push_str("  Lease lost during run\n");
    }
    for failure in &report.pass_failures {
        out.push_str(&format!("  Pass failed: {}\n", failure));
    }
    out.push_str(&format!("  Elapsed:            {} ms\n", report.elapsed_ms));
    out
}

/// `resync run`: one reconciliation. Returns the process exit code.
pub async fn run_once(globals: &GlobalOverrides, run: &RunOverrides, json: bool) -> Result<i32> {
    let mut settings = load_settings(globals)?;
    apply_run_overrides(&mut settings, run);
    init_logging(&settings.log_level)?;

    let stack = ResyncStack::open(&settings)?;
    let job = match stack.job(&settings) {
        Ok(job) => job,
        Err(e) => {
            error!("Invalid reconcile configuration: {}", e);
            eprintln!("{}", e);
            return Ok(EXIT_HARD_FAILURE);
        }
    };

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Stopping after the current page");
            cancel.cancel();
        }
    });

    let result = job.run_once(cancel).await;
    signal_task.abort();

    match &result {
        Ok(report) if json => {
            println!(
                "{}",
                serde_json::to_string_pretty(report).context("Failed to serialize report")?
            );
        }
        Ok(report) => print!("{}", format_report(report)),
        Err(ReconcileError::AlreadyRunning { job }) => {
            eprintln!("Job {} is already running elsewhere; nothing done", job);
        }
        Err(e) => eprintln!("Reconciliation failed: {}", e),
    }

    Ok(exit_code(&result))
}

/// `resync start`: schedule reconciliation until a shutdown signal.
pub async fn start_daemon(globals: &GlobalOverrides, foreground: bool) -> Result<()> {
    let settings = load_settings(globals)?;
    init_logging(&settings.log_level)?;

    info!("Resync daemon starting...");
    info!("  Database path: {}", settings.db_path);
    info!("  Index path: {}", settings.index_path);
    info!(
        "  Schedule: {} ({})",
        settings.schedule.cron, settings.schedule.timezone
    );

    if !foreground {
        warn!("Background mode not supported, running in foreground");
        warn!("Use a process manager (systemd, launchd) for background operation");
    }

    let stack = ResyncStack::open(&settings)?;
    let job = Arc::new(stack.job(&settings).context("Invalid reconcile configuration")?);

    let mut scheduler = SchedulerService::new(
        SchedulerConfig::default().with_timezone(settings.schedule.timezone.clone()),
    )
    .await
    .context("Failed to create scheduler")?;

    if register_resync_job(&scheduler, job, &settings.schedule)
        .await
        .context("Failed to register resync job")?
        .is_none()
    {
        warn!("Schedule is disabled; the daemon will idle until stopped");
    }

    scheduler.start().await.context("Failed to start scheduler")?;

    shutdown_signal().await;

    scheduler
        .shutdown()
        .await
        .context("Failed to shut down scheduler")?;

    if let Some(status) = scheduler.registry().get_status(RESYNC_JOB_NAME) {
        info!(
            runs = status.run_count,
            errors = status.error_count,
            skipped = status.skip_count,
            "Final job status"
        );
    }
    stack.storage.flush().context("Failed to flush storage")?;

    Ok(())
}

/// `resync status`: counts from both stores and the current lease.
pub fn show_status(globals: &GlobalOverrides) -> Result<()> {
    let settings = load_settings(globals)?;
    let stack = ResyncStack::open(&settings)?;

    let stats = stack
        .storage
        .get_stats()
        .context("Failed to read storage stats")?;
    let searcher = stack.index_store.searcher();
    let provisional = searcher
        .count_by_status(EntryStatus::Provisional)
        .context("Failed to count provisional entries")?;
    let total = searcher.num_docs() as usize;

    println!("System of record ({}):", settings.db_path);
    println!("  Items:        {}", stats.item_count);
    println!("  Collections:  {}", stats.collection_count);
    println!("  Disk usage:   {} bytes", stats.disk_usage_bytes);
    println!("Search index ({}):", stack.index.path().display());
    println!("  Documents:    {}", total);
    println!("  Provisional:  {}", provisional);
    println!("  Confirmed:    {}", total.saturating_sub(provisional));

    match stack
        .storage
        .get_lease(RESYNC_JOB_NAME)
        .context("Failed to read run lease")?
    {
        Some(lease) if !lease.is_expired(chrono::Utc::now()) => {
            println!(
                "Run in progress: holder {} (expires {})",
                lease.holder, lease.expires_at
            );
        }
        _ => println!("No run in progress"),
    }

    Ok(())
}

/// `resync show-config`
pub fn show_config(globals: &GlobalOverrides) -> Result<()> {
    let settings = load_settings(globals)?;
    print!("{}", render_config(&settings)?);
    Ok(())
}

fn render_config(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to render configuration")
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
