//! The reconciliation job.
//!
//! Each run makes two passes over the index:
//!
//! 1. Provisional entries. Stale ones are promoted to confirmed when their
//!    record exists and purged when it does not. Fresh ones are skipped.
//! 2. Confirmed entries. Those whose record is gone are purged.
//!
//! Both passes page by id cursor, so entries leaving a status mid-run never
//! shift later pages. Index writes are committed once per page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use resync_types::{EntryStatus, IndexDocument, IndexEntry, ReconcileConfig};

use crate::error::ReconcileError;
use crate::report::{EntryOutcome, ReconciliationReport};
use crate::staleness::is_stale;
use crate::store::{IndexStore, RunLease, SystemOfRecord};

/// Lease key shared by every process running this job.
pub const RESYNC_JOB_NAME: &str = "index-db-resync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Provisional,
    ConfirmedOrphans,
}

impl Pass {
    fn status(&self) -> EntryStatus {
        match self {
            Pass::Provisional => EntryStatus::Provisional,
            Pass::ConfirmedOrphans => EntryStatus::Confirmed,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Pass::Provisional => "provisional",
            Pass::ConfirmedOrphans => "confirmed-orphans",
        }
    }
}

/// Converges the index toward the system of record.
pub struct ReconciliationJob {
    config: ReconcileConfig,
    index: Arc<dyn IndexStore>,
    sor: Arc<dyn SystemOfRecord>,
    lease: Arc<dyn RunLease>,
    running: AtomicBool,
}

impl ReconciliationJob {
    /// Create a job. Fails if the configuration is invalid.
    pub fn new(
        config: ReconcileConfig,
        index: Arc<dyn IndexStore>,
        sor: Arc<dyn SystemOfRecord>,
        lease: Arc<dyn RunLease>,
    ) -> Result<Self, ReconcileError> {
        config.validate()?;
        Ok(Self {
            config,
            index,
            sor,
            lease,
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Whether a run is in progress in this process.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run both passes to completion, or until `cancel` fires between pages.
    ///
    /// Returns `AlreadyRunning` without touching the index if another run
    /// holds the job lease. Entry-level and pass-level failures are recorded
    /// in the report rather than returned.
    pub async fn run_once(
        &self,
        cancel: CancellationToken,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let _active = ActiveRun::enter(&self.running).ok_or_else(|| {
            ReconcileError::AlreadyRunning {
                job: RESYNC_JOB_NAME.to_string(),
            }
        })?;

        let holder = Ulid::new().to_string();
        if !self
            .lease
            .try_acquire(RESYNC_JOB_NAME, &holder, self.config.lease_ttl())?
        {
            info!(job = RESYNC_JOB_NAME, "Another run holds the lease, not starting");
            return Err(ReconcileError::AlreadyRunning {
                job: RESYNC_JOB_NAME.to_string(),
            });
        }
        let lease = LeaseGuard {
            lease: self.lease.clone(),
            holder: holder.clone(),
        };

        let start = Instant::now();
        let mut report = ReconciliationReport::new(holder, self.config.dry_run);

        info!(
            run_id = %report.run_id,
            time_until_reindex_ms = self.config.time_until_reindex_ms,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            dry_run = self.config.dry_run,
            "Starting reconciliation run"
        );

        self.run_pass(Pass::Provisional, &lease, &cancel, &mut report)
            .await;

        if !self.config.purge_confirmed_orphans {
            debug!("Confirmed orphan pass disabled");
        } else if report.cancelled || report.lease_lost {
            debug!("Skipping confirmed orphan pass");
        } else {
            self.run_pass(Pass::ConfirmedOrphans, &lease, &cancel, &mut report)
                .await;
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            run_id = %report.run_id,
            scanned = report.scanned,
            promoted = report.promoted,
            purged = report.purged(),
            skipped_fresh = report.skipped_fresh,
            errors = report.errors,
            pass_failures = report.pass_failures.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "Reconciliation run complete"
        );

        Ok(report)
    }

    async fn run_pass(
        &self,
        pass: Pass,
        lease: &LeaseGuard,
        cancel: &CancellationToken,
        report: &mut ReconciliationReport,
    ) {
        let batch_size = self.config.batch_size;
        let mut cursor: Option<String> = None;

        info!(pass = pass.label(), "Starting pass");

        loop {
            if cancel.is_cancelled() {
                info!(pass = pass.label(), "Cancelled before next page");
                report.cancelled = true;
                return;
            }

            match lease.renew(self.config.lease_ttl()) {
                Ok(true) => {}
                Ok(false) => {
                    error!(pass = pass.label(), "Run lease taken by another holder");
                    report.lease_lost = true;
                    report.record_pass_failure(pass.label(), "run lease lost");
                    return;
                }
                Err(e) => {
                    error!(pass = pass.label(), error = %e, "Lease renewal failed");
                    report.record_pass_failure(pass.label(), e);
                    return;
                }
            }

            let page = match self
                .index
                .query_by_status(pass.status(), cursor.as_deref(), batch_size)
            {
                Ok(page) => page,
                Err(e) => {
                    error!(pass = pass.label(), error = %e, "Page query failed, aborting pass");
                    report.record_pass_failure(pass.label(), e);
                    return;
                }
            };

            report.pages += 1;
            let matched = page.matched();
            if page.last_id.is_some() {
                cursor = page.last_id.clone();
            }

            if !page.unreadable.is_empty() {
                warn!(
                    pass = pass.label(),
                    unreadable = ?page.unreadable,
                    "Skipping index documents that could not be read"
                );
            }
            let unreadable = page.unreadable.len();
            let mut outcomes = self.process_page(pass, page.entries).await;
            outcomes.extend(std::iter::repeat(EntryOutcome::Failed).take(unreadable));

            let mut mutated = 0;
            for outcome in outcomes {
                if outcome.mutated() {
                    mutated += 1;
                }
                match pass {
                    Pass::Provisional => report.record_provisional(outcome),
                    Pass::ConfirmedOrphans => report.record_confirmed(outcome),
                }
            }

            if mutated > 0 && !self.config.dry_run {
                if let Err(e) = self.index.commit() {
                    error!(pass = pass.label(), error = %e, "Commit failed, aborting pass");
                    report.record_pass_failure(pass.label(), e);
                    return;
                }
            }

            debug!(
                pass = pass.label(),
                page = report.pages,
                matched,
                mutated,
                "Processed page"
            );

            if matched < batch_size {
                break;
            }
        }

        info!(pass = pass.label(), "Pass complete");
    }

    /// Handle every entry of a page on at most `concurrency` blocking tasks.
    async fn process_page(&self, pass: Pass, page: Vec<IndexEntry>) -> Vec<EntryOutcome> {
        if page.is_empty() {
            return Vec::new();
        }

        let ctx = Arc::new(EntryContext {
            index: self.index.clone(),
            sor: self.sor.clone(),
            now: Utc::now(),
            time_until_reindex: self.config.time_until_reindex(),
            dry_run: self.config.dry_run,
        });

        stream::iter(page)
            .map(|entry| {
                let ctx = ctx.clone();
                async move {
                    let id = entry.id.clone();
                    let task = tokio::task::spawn_blocking(move || match pass {
                        Pass::Provisional => ctx.reconcile_provisional(&entry),
                        Pass::ConfirmedOrphans => ctx.reconcile_confirmed(&entry),
                    });
                    match task.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(id = %id, error = %e, "Entry task failed");
                            EntryOutcome::Failed
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await
    }
}

/// Everything one entry needs, shared by the tasks of a page.
struct EntryContext {
    index: Arc<dyn IndexStore>,
    sor: Arc<dyn SystemOfRecord>,
    now: DateTime<Utc>,
    time_until_reindex: Duration,
    dry_run: bool,
}

impl EntryContext {
    fn reconcile_provisional(&self, entry: &IndexEntry) -> EntryOutcome {
        if !is_stale(entry, self.now, self.time_until_reindex) {
            debug!(id = %entry.id, "Within grace period, skipping");
            return EntryOutcome::SkippedFresh;
        }

        let result = match self.sor.exists(&entry.id) {
            Ok(true) => self.promote(entry),
            Ok(false) => self.purge(entry),
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Existence check failed, leaving entry");
                return EntryOutcome::Failed;
            }
        };

        result.unwrap_or_else(|e| {
            warn!(id = %entry.id, error = %e, "Failed to repair provisional entry");
            EntryOutcome::Failed
        })
    }

    fn reconcile_confirmed(&self, entry: &IndexEntry) -> EntryOutcome {
        let result = match self.sor.exists(&entry.id) {
            Ok(true) => return EntryOutcome::Verified,
            Ok(false) => self.purge(entry),
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Existence check failed, leaving entry");
                return EntryOutcome::Failed;
            }
        };

        result.unwrap_or_else(|e| {
            warn!(id = %entry.id, error = %e, "Failed to purge confirmed orphan");
            EntryOutcome::Failed
        })
    }

    fn promote(&self, entry: &IndexEntry) -> Result<EntryOutcome, ReconcileError> {
        // Another writer may have confirmed or removed it since the page query
        match self.index.get(&entry.id)? {
            Some(current) if current.is_provisional() => {}
            _ => {
                debug!(id = %entry.id, "Entry no longer provisional");
                return Ok(EntryOutcome::AlreadyResolved);
            }
        }

        let Some(record) = self.sor.fetch_for_indexing(&entry.id)? else {
            debug!(id = %entry.id, "Record vanished after existence check");
            return self.purge(entry);
        };

        if !self.dry_run {
            let document = IndexDocument::from_record(&record, EntryStatus::Confirmed, Utc::now());
            self.index.upsert(&document)?;
        }
        debug!(id = %entry.id, dry_run = self.dry_run, "Promoted entry");
        Ok(EntryOutcome::Promoted)
    }

    fn purge(&self, entry: &IndexEntry) -> Result<EntryOutcome, ReconcileError> {
        if !self.dry_run {
            self.index.delete(&entry.id)?;
        }
        debug!(id = %entry.id, status = %entry.status, dry_run = self.dry_run, "Purged orphan entry");
        Ok(EntryOutcome::Purged)
    }
}

/// Marks a run active in this process until dropped.
struct ActiveRun<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ActiveRun<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Holds the job lease for one run and releases it when dropped.
struct LeaseGuard {
    lease: Arc<dyn RunLease>,
    holder: String,
}

impl LeaseGuard {
    fn renew(&self, ttl: Duration) -> Result<bool, ReconcileError> {
        self.lease.try_acquire(RESYNC_JOB_NAME, &self.holder, ttl)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        match self.lease.release(RESYNC_JOB_NAME, &self.holder) {
            Ok(true) => debug!(holder = %self.holder, "Released run lease"),
            Ok(false) => warn!(holder = %self.holder, "Run lease was not held at release"),
            Err(e) => warn!(holder = %self.holder, error = %e, "Failed to release run lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryIndexStore, InMemoryLease, InMemorySystemOfRecord};
    use crate::report::RunOutcome;
    use resync_types::ItemRecord;

    const THRESHOLD_MS: i64 = 1_000;

    struct Fixture {
        index: Arc<InMemoryIndexStore>,
        sor: Arc<InMemorySystemOfRecord>,
        lease: Arc<InMemoryLease>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                index: Arc::new(InMemoryIndexStore::new()),
                sor: Arc::new(InMemorySystemOfRecord::new()),
                lease: Arc::new(InMemoryLease::new()),
            }
        }

        fn job(&self, config: ReconcileConfig) -> ReconciliationJob {
            ReconciliationJob::new(
                config,
                self.index.clone(),
                self.sor.clone(),
                self.lease.clone(),
            )
            .unwrap()
        }

        /// Stale provisional entry, optionally backed by a record.
        fn stale_provisional(&self, id: &str, backed: bool) {
            let written = Utc::now() - Duration::minutes(5);
            self.index
                .insert_entry(IndexEntry::new(id, EntryStatus::Provisional, written));
            if backed {
                self.sor
                    .insert(ItemRecord::with_id(id, "col", format!("Item {}", id)));
            }
        }

        fn fresh_provisional(&self, id: &str, backed: bool) {
            self.index.insert_entry(IndexEntry::provisional(id));
            if backed {
                self.sor.insert(ItemRecord::with_id(id, "col", "fresh"));
            }
        }

        fn confirmed(&self, id: &str, backed: bool) {
            let written = Utc::now() - Duration::minutes(5);
            self.index
                .insert_entry(IndexEntry::new(id, EntryStatus::Confirmed, written));
            if backed {
                self.sor.insert(ItemRecord::with_id(id, "col", "confirmed"));
            }
        }
    }

    fn config() -> ReconcileConfig {
        ReconcileConfig::default()
            .with_time_until_reindex_ms(THRESHOLD_MS)
            .with_batch_size(5)
    }

    #[tokio::test]
    async fn test_promotes_stale_provisional_with_record() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.promoted, 1);
        assert_eq!(report.purged(), 0);
        let doc = fx.index.document("a").unwrap();
        assert_eq!(doc.entry.status, EntryStatus::Confirmed);
        assert_eq!(doc.title, "Item a");
        assert_eq!(doc.collection_id.as_deref(), Some("col"));
        assert_eq!(report.outcome(), RunOutcome::Success);
    }

    #[tokio::test]
    async fn test_purges_stale_provisional_orphan() {
        let fx = Fixture::new();
        fx.stale_provisional("orphan", false);

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.purged_provisional, 1);
        assert!(!fx.index.contains("orphan"));
    }

    #[tokio::test]
    async fn test_fresh_entries_untouched() {
        let fx = Fixture::new();
        fx.fresh_provisional("backed", true);
        fx.fresh_provisional("unbacked", false);

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.skipped_fresh, 2);
        assert_eq!(report.repaired(), 0);
        assert_eq!(
            fx.index.entry("backed").unwrap().status,
            EntryStatus::Provisional
        );
        assert_eq!(
            fx.index.entry("unbacked").unwrap().status,
            EntryStatus::Provisional
        );
        assert_eq!(fx.sor.lookup_count(), 0);
        assert_eq!(fx.index.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let fx = Fixture::new();
        for i in 0..6 {
            fx.stale_provisional(&format!("item-{}", i), i % 2 == 0);
        }
        let job = fx.job(config());

        let first = job.run_once(CancellationToken::new()).await.unwrap();
        assert_eq!(first.promoted, 3);
        assert_eq!(first.purged_provisional, 3);
        let after_first = fx.index.len();

        let second = job.run_once(CancellationToken::new()).await.unwrap();
        assert_eq!(second.promoted, 0);
        assert_eq!(second.purged(), 0);
        assert_eq!(second.verified, 3);
        assert_eq!(fx.index.len(), after_first);
    }

    #[tokio::test]
    async fn test_pagination_visits_every_entry_once() {
        let fx = Fixture::new();
        let ids: Vec<String> = (0..23).map(|i| format!("item-{:02}", i)).collect();
        for (i, id) in ids.iter().enumerate() {
            fx.stale_provisional(id, i % 3 != 0);
        }

        let report = fx
            .job(config().with_purge_confirmed_orphans(false))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.scanned, 23);
        assert_eq!(report.repaired(), 23);
        assert_eq!(report.pages, 5);
        for id in &ids {
            assert_eq!(fx.index.write_count(id), 1, "{} written more than once", id);
        }
        assert_eq!(fx.index.count_by_status(EntryStatus::Provisional), 0);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_batch_size_ends_on_empty_page() {
        let fx = Fixture::new();
        for i in 0..10 {
            fx.stale_provisional(&format!("item-{:02}", i), true);
        }

        let report = fx
            .job(config().with_purge_confirmed_orphans(false))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.promoted, 10);
        assert_eq!(report.pages, 3);
        assert_eq!(fx.index.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_workers_process_all_entries() {
        let fx = Fixture::new();
        for i in 0..40 {
            fx.stale_provisional(&format!("item-{:02}", i), i % 4 != 0);
        }

        let report = fx
            .job(config().with_batch_size(7).with_concurrency(4))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.promoted, 30);
        assert_eq!(report.purged_provisional, 10);
        assert_eq!(fx.index.count_by_status(EntryStatus::Confirmed), 30);
        assert_eq!(fx.index.len(), 30);
    }

    #[tokio::test]
    async fn test_failed_lookup_never_deletes() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);
        fx.stale_provisional("b", false);
        fx.stale_provisional("c", false);
        fx.sor.fail_lookups_for("b");

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.promoted, 1);
        assert_eq!(report.purged_provisional, 1);
        assert_eq!(fx.index.entry("b").unwrap().status, EntryStatus::Provisional);
        assert!(!fx.index.contains("c"));
        assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    }

    #[tokio::test]
    async fn test_write_failure_is_isolated() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);
        fx.stale_provisional("b", true);
        fx.index.fail_writes_for("a");

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.promoted, 1);
        assert_eq!(fx.index.entry("a").unwrap().status, EntryStatus::Provisional);
        assert_eq!(fx.index.entry("b").unwrap().status, EntryStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unreachable_system_of_record_is_hard_failure() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);
        fx.stale_provisional("b", false);
        fx.sor.set_unavailable(true);

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.errors, 2);
        assert_eq!(fx.index.len(), 2);
        assert_eq!(report.outcome(), RunOutcome::HardFailure);
    }

    #[tokio::test]
    async fn test_confirmed_orphans_purged() {
        let fx = Fixture::new();
        fx.confirmed("kept", true);
        fx.confirmed("gone", false);

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.purged_confirmed, 1);
        assert_eq!(report.verified, 1);
        assert!(fx.index.contains("kept"));
        assert!(!fx.index.contains("gone"));
    }

    #[tokio::test]
    async fn test_confirmed_orphan_pass_can_be_disabled() {
        let fx = Fixture::new();
        fx.confirmed("gone", false);

        let report = fx
            .job(config().with_purge_confirmed_orphans(false))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.scanned, 0);
        assert!(fx.index.contains("gone"));
    }

    #[tokio::test]
    async fn test_query_failure_aborts_only_that_pass() {
        let fx = Fixture::new();
        fx.stale_provisional("p", true);
        fx.confirmed("gone", false);
        fx.index.fail_queries_for(EntryStatus::Provisional);

        let report = fx.job(config()).run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.pass_failures.len(), 1);
        assert!(report.pass_failures[0].starts_with("provisional"));
        assert_eq!(report.purged_confirmed, 1);
        assert_eq!(fx.index.entry("p").unwrap().status, EntryStatus::Provisional);
        assert_eq!(report.outcome(), RunOutcome::HardFailure);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fx.job(config()).run_once(cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.pages, 0);
        assert_eq!(fx.index.entry("a").unwrap().status, EntryStatus::Provisional);
        assert!(fx.lease.holder(RESYNC_JOB_NAME).is_none());
    }

    #[tokio::test]
    async fn test_refuses_when_lease_held() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);
        fx.lease
            .try_acquire(RESYNC_JOB_NAME, "other-process", Duration::minutes(5))
            .unwrap();

        let err = fx
            .job(config())
            .run_once(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::AlreadyRunning { .. }));
        assert_eq!(fx.index.entry("a").unwrap().status, EntryStatus::Provisional);
        assert_eq!(
            fx.lease.holder(RESYNC_JOB_NAME).as_deref(),
            Some("other-process")
        );
    }

    #[tokio::test]
    async fn test_lease_released_after_run() {
        let fx = Fixture::new();
        let job = fx.job(config());
        job.run_once(CancellationToken::new()).await.unwrap();

        assert!(fx.lease.holder(RESYNC_JOB_NAME).is_none());
        assert!(!job.is_running());
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_mutating() {
        let fx = Fixture::new();
        fx.stale_provisional("a", true);
        fx.stale_provisional("b", false);
        fx.confirmed("gone", false);

        let report = fx
            .job(config().with_dry_run(true))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.promoted, 1);
        assert_eq!(report.purged(), 2);
        assert_eq!(fx.index.len(), 3);
        assert_eq!(fx.index.entry("a").unwrap().status, EntryStatus::Provisional);
        assert_eq!(fx.index.commit_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fx = Fixture::new();
        let result = ReconciliationJob::new(
            config().with_batch_size(0),
            fx.index.clone(),
            fx.sor.clone(),
            fx.lease.clone(),
        );
        assert!(matches!(result, Err(ReconcileError::Config(_))));
    }

    /// Confirms the index entry itself during the existence check, as the
    /// application write path would.
    struct ConfirmingRecord {
        index: Arc<InMemoryIndexStore>,
    }

    impl SystemOfRecord for ConfirmingRecord {
        fn exists(&self, id: &str) -> Result<bool, ReconcileError> {
            self.index.insert_entry(IndexEntry::confirmed(id));
            Ok(true)
        }

        fn fetch_for_indexing(
            &self,
            _id: &str,
        ) -> Result<Option<resync_types::ItemRecord>, ReconcileError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_entry_confirmed_concurrently_is_left_alone() {
        let fx = Fixture::new();
        fx.stale_provisional("a", false);
        let job = ReconciliationJob::new(
            config().with_purge_confirmed_orphans(false),
            fx.index.clone(),
            Arc::new(ConfirmingRecord {
                index: fx.index.clone(),
            }),
            fx.lease.clone(),
        )
        .unwrap();

        let report = job.run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.already_resolved, 1);
        assert_eq!(fx.index.write_count("a"), 0);
        assert_eq!(fx.index.entry("a").unwrap().status, EntryStatus::Confirmed);
    }

    /// Reports every record as existing but can never load one.
    struct VanishingRecord;

    impl SystemOfRecord for VanishingRecord {
        fn exists(&self, _id: &str) -> Result<bool, ReconcileError> {
            Ok(true)
        }

        fn fetch_for_indexing(
            &self,
            _id: &str,
        ) -> Result<Option<resync_types::ItemRecord>, ReconcileError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_record_vanishing_after_check_is_purged() {
        let fx = Fixture::new();
        fx.stale_provisional("a", false);
        let job = ReconciliationJob::new(
            config(),
            fx.index.clone(),
            Arc::new(VanishingRecord),
            fx.lease.clone(),
        )
        .unwrap();

        let report = job.run_once(CancellationToken::new()).await.unwrap();

        assert_eq!(report.purged_provisional, 1);
        assert!(!fx.index.contains("a"));
    }

    #[tokio::test]
    async fn test_unreadable_document_does_not_stop_orphan_purge() {
        let fx = Fixture::new();
        fx.confirmed("a-kept", true);
        fx.confirmed("b-gone", false);
        fx.index.insert_unreadable("c-odd", EntryStatus::Confirmed);
        fx.confirmed("d-gone", false);
        fx.confirmed("e-gone", false);

        let report = fx
            .job(config().with_batch_size(2))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.pass_failures.is_empty());
        assert_eq!(report.purged_confirmed, 3);
        assert_eq!(report.verified, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.scanned, 5);
        assert_eq!(report.outcome(), RunOutcome::PartialFailure);
        assert!(fx.index.contains("a-kept"));
        for id in ["b-gone", "d-gone", "e-gone"] {
            assert!(!fx.index.contains(id), "{} not purged", id);
        }
    }

    #[tokio::test]
    async fn test_page_of_only_unreadable_documents_advances() {
        let fx = Fixture::new();
        fx.index.insert_unreadable("a", EntryStatus::Provisional);
        fx.index.insert_unreadable("b", EntryStatus::Provisional);
        fx.stale_provisional("c", true);

        let report = fx
            .job(config().with_batch_size(2).with_purge_confirmed_orphans(false))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.errors, 2);
        assert_eq!(report.promoted, 1);
        assert_eq!(fx.index.entry("c").unwrap().status, EntryStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_lease_lost_between_pages_stops_run() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.stale_provisional(&format!("item-{}", i), true);
        }
        fx.confirmed("gone", false);
        // Calls: acquire, renew before page 1, renew before page 2
        fx.lease.hand_over_at(3, "other-process");

        let report = fx
            .job(config().with_batch_size(2))
            .run_once(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.lease_lost);
        assert_eq!(report.pages, 1);
        assert_eq!(report.promoted, 2);
        assert_eq!(report.pass_failures.len(), 1);
        assert!(report.pass_failures[0].starts_with("provisional"));
        assert_eq!(report.outcome(), RunOutcome::HardFailure);
        // No confirmed-orphan pass once the lease is gone
        assert_eq!(report.purged_confirmed, 0);
        assert!(fx.index.contains("gone"));
        assert_eq!(fx.index.count_by_status(EntryStatus::Provisional), 3);
        assert_eq!(
            fx.lease.holder(RESYNC_JOB_NAME).as_deref(),
            Some("other-process")
        );
    }

    #[tokio::test]
    async fn test_cancelled_between_pages() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.stale_provisional(&format!("item-{}", i), true);
        }
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        fx.index.on_commit(move |_| trigger.cancel());

        let report = fx.job(config().with_batch_size(2)).run_once(cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.pages, 1);
        assert_eq!(report.promoted, 2);
        assert!(report.pass_failures.is_empty());
        assert_eq!(fx.index.commit_count(), 1);
        for id in ["item-0", "item-1"] {
            assert_eq!(fx.index.entry(id).unwrap().status, EntryStatus::Confirmed);
        }
        for id in ["item-2", "item-3", "item-4"] {
            assert_eq!(fx.index.entry(id).unwrap().status, EntryStatus::Provisional);
        }
        assert!(fx.lease.holder(RESYNC_JOB_NAME).is_none());
    }
}
