//! Scheduled index/database reconciliation.
//!
//! Runs [`ReconciliationJob::run_once`] on the configured cron schedule and
//! records the report counters in the job registry.

use std::sync::Arc;

use resync_reconcile::{ReconcileError, ReconciliationJob, ReconciliationReport, RunOutcome};
use resync_types::ScheduleSettings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{JitterConfig, JobOutput, SchedulerError, SchedulerService};

pub use resync_reconcile::RESYNC_JOB_NAME;

/// Register the reconciliation job with the scheduler.
///
/// Returns `Ok(None)` without registering when the schedule is disabled.
/// Accepts standard 5-field cron as well as 6-field with seconds.
pub async fn register_resync_job(
    scheduler: &SchedulerService,
    job: Arc<ReconciliationJob>,
    settings: &ScheduleSettings,
) -> Result<Option<uuid::Uuid>, SchedulerError> {
    if !settings.enabled {
        info!(job = RESYNC_JOB_NAME, "Schedule disabled, not registering");
        return Ok(None);
    }

    let cron = convert_5field_to_6field(&settings.cron);
    let uuid = scheduler
        .register_job(
            RESYNC_JOB_NAME,
            &cron,
            Some(&settings.timezone),
            JitterConfig::new(settings.jitter_secs),
            move |cancel| {
                let job = job.clone();
                async move { run_resync(&job, cancel).await }
            },
        )
        .await?;

    Ok(Some(uuid))
}

/// One scheduled run, mapped onto the scheduler's success/skip/failure.
pub async fn run_resync(
    job: &ReconciliationJob,
    cancel: CancellationToken,
) -> Result<JobOutput, String> {
    match job.run_once(cancel).await {
        Ok(report) => {
            let outcome = report.outcome();
            if outcome == RunOutcome::HardFailure {
                return Err(hard_failure_message(&report));
            }
            Ok(report_output(&report))
        }
        Err(ReconcileError::AlreadyRunning { .. }) => {
            Ok(JobOutput::skipped("another run holds the lease"))
        }
        Err(e) => {
            warn!(job = RESYNC_JOB_NAME, error = %e, "Reconciliation run failed");
            Err(e.to_string())
        }
    }
}

fn report_output(report: &ReconciliationReport) -> JobOutput {
    JobOutput::new()
        .with_metadata("run_id", &report.run_id)
        .with_metadata("outcome", report.outcome().as_str())
        .with_metadata("scanned", report.scanned)
        .with_metadata("promoted", report.promoted)
        .with_metadata("purged", report.purged())
        .with_metadata("skipped_fresh", report.skipped_fresh)
        .with_metadata("errors", report.errors)
        .with_metadata("cancelled", report.cancelled)
}

fn hard_failure_message(report: &ReconciliationReport) -> String {
    if report.pass_failures.is_empty() {
        format!("all {} attempted entries failed", report.errors)
    } else {
        report.pass_failures.join("; ")
    }
}

/// Prepend a seconds field to a 5-field cron expression.
///
/// tokio-cron-scheduler expects `sec min hour day month weekday`; operators
/// usually write the classic five fields.
fn convert_5field_to_6field(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use resync_reconcile::{InMemoryIndexStore, InMemoryLease, InMemorySystemOfRecord, RunLease};
    use resync_types::{EntryStatus, IndexEntry, ItemRecord, ReconcileConfig};

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

        fn job(&self) -> ReconciliationJob {
            ReconciliationJob::new(
                ReconcileConfig::default().with_time_until_reindex_ms(1_000),
                self.index.clone(),
                self.sor.clone(),
                self.lease.clone(),
            )
            .unwrap()
        }

        fn stale(&self, id: &str, backed: bool) {
            let written = Utc::now() - Duration::minutes(5);
            self.index
                .insert_entry(IndexEntry::new(id, EntryStatus::Provisional, written));
            if backed {
                self.sor.insert(ItemRecord::with_id(id, "col", "Title"));
            }
        }
    }

    #[test]
    fn test_convert_5field_to_6field() {
        assert_eq!(convert_5field_to_6field("*/30 * * * *"), "0 */30 * * * *");
        assert_eq!(convert_5field_to_6field("0 3 * * *"), "0 0 3 * * *");
        assert_eq!(convert_5field_to_6field("15 0 3 * * *"), "15 0 3 * * *");
        assert_eq!(convert_5field_to_6field("  0 3 * * * "), "0 0 3 * * *");
    }

    #[tokio::test]
    async fn test_run_resync_success_metadata() {
        let fixture = Fixture::new();
        fixture.stale("a", true);
        fixture.stale("b", false);

        let output = run_resync(&fixture.job(), CancellationToken::new())
            .await
            .unwrap();

        assert!(output.skipped.is_none());
        assert_eq!(output.metadata.get("outcome").unwrap(), "success");
        assert_eq!(output.metadata.get("promoted").unwrap(), "1");
        assert_eq!(output.metadata.get("purged").unwrap(), "1");
        assert_eq!(output.metadata.get("errors").unwrap(), "0");
    }

    #[tokio::test]
    async fn test_run_resync_skips_when_lease_held() {
        let fixture = Fixture::new();
        fixture.stale("a", true);
        assert!(fixture
            .lease
            .try_acquire(RESYNC_JOB_NAME, "other-host", Duration::minutes(10))
            .unwrap());

        let output = run_resync(&fixture.job(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.skipped.as_deref(), Some("another run holds the lease"));
        assert_eq!(fixture.index.count_by_status(EntryStatus::Provisional), 1);
    }

    #[tokio::test]
    async fn test_run_resync_hard_failure_is_error() {
        let fixture = Fixture::new();
        fixture.stale("a", true);
        fixture.index.fail_queries_for(EntryStatus::Provisional);

        let err = run_resync(&fixture.job(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.contains("provisional"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_resync_job() {
        let scheduler = SchedulerService::new(Default::default()).await.unwrap();
        let job = Arc::new(Fixture::new().job());

        let uuid = register_resync_job(&scheduler, job.clone(), &ScheduleSettings::default())
            .await
            .unwrap();
        assert!(uuid.is_some());

        let status = scheduler.registry().get_status(RESYNC_JOB_NAME).unwrap();
        assert_eq!(status.cron_expr, "0 */30 * * * *");
        assert_eq!(status.run_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_disabled_or_invalid() {
        let scheduler = SchedulerService::new(Default::default()).await.unwrap();
        let job = Arc::new(Fixture::new().job());

        let disabled = ScheduleSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(register_resync_job(&scheduler, job.clone(), &disabled)
            .await
            .unwrap()
            .is_none());
        assert!(!scheduler.registry().is_registered(RESYNC_JOB_NAME));

        let bad_tz = ScheduleSettings {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            register_resync_job(&scheduler, job, &bad_tz).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }
}
