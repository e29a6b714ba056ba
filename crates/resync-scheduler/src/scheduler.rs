//! Cron scheduling for the daemon's jobs.
//!
//! [`SchedulerService`] owns a `tokio-cron-scheduler` instance. Jobs enter
//! only through [`SchedulerService::register_job`], so every tick is recorded
//! in the [`JobRegistry`], a tick that overlaps a running one is skipped, and
//! each run is tracked for shutdown to wait on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::parse_tz;
use crate::jitter::JitterConfig;
use crate::overlap::OverlapGuard;
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Lifecycle owner for the daemon's cron jobs.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl SchedulerService {
    /// Create a stopped scheduler. Fails on an unknown default timezone.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;

        Ok(Self {
            scheduler: JobScheduler::new().await?,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Cancel running jobs, wait up to `shutdown_timeout_secs` for them to
    /// return, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!(in_flight = self.tracker.len(), "Stopping scheduler");
        self.shutdown.cancel();
        self.tracker.close();

        let grace = Duration::from_secs(self.config.shutdown_timeout_secs);
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                timeout_secs = self.config.shutdown_timeout_secs,
                in_flight = self.tracker.len(),
                "Jobs still running at shutdown timeout"
            );
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.started.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run history of every registered job.
    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Schedule `job_fn` on a 6-field cron expression (seconds first).
    ///
    /// Each run starts after a random delay drawn from `jitter` and receives
    /// a token cancelled at shutdown. `job_fn` returns `Err(message)` for a
    /// failed run and [`JobOutput::skipped`] for a run it declined to
    /// perform. Nothing is registered if the expression or the timezone
    /// (default: the configured one) is invalid.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        jitter: JitterConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz = match timezone {
            Some(name) => parse_tz(name)?,
            None => self.config.parse_timezone()?,
        };

        let tick = Arc::new(Tick {
            name: name.to_string(),
            job_fn,
            jitter,
            guard: OverlapGuard::new(),
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
        });

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let tick = tick.clone();
            Box::pin(async move { tick.fire().await })
        })
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", cron_expr, e)))?;

        self.registry.register(name, cron_expr);
        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");

        Ok(uuid)
    }
}

/// Per-job state shared by every tick of that job.
struct Tick<F> {
    name: String,
    job_fn: F,
    jitter: JitterConfig,
    guard: OverlapGuard,
    registry: Arc<JobRegistry>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<F, Fut> Tick<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
{
    async fn fire(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let Some(_run) = self.guard.try_acquire() else {
            info!(job = %self.name, "Previous run still in progress, skipping tick");
            self.registry
                .record_skip(&self.name, "previous run still in progress");
            return;
        };

        self.tracker.track_future(self.run()).await;
    }

    async fn run(&self) {
        if !self.jitter.delay(&self.shutdown).await {
            debug!(job = %self.name, "Cancelled before start");
            return;
        }

        self.registry.record_start(&self.name);
        let start = Instant::now();
        let outcome = (self.job_fn)(self.shutdown.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (result, metadata) = match outcome {
            Ok(JobOutput {
                skipped: Some(reason),
                metadata,
            }) => {
                info!(job = %self.name, reason = %reason, "Job skipped");
                (JobResult::Skipped(reason), metadata)
            }
            Ok(output) => {
                info!(job = %self.name, duration_ms, "Job succeeded");
                (JobResult::Success, output.metadata)
            }
            Err(message) => {
                warn!(job = %self.name, duration_ms, error = %message, "Job failed");
                (JobResult::Failed(message), Default::default())
            }
        };
        self.registry
            .record_complete(&self.name, result, duration_ms, metadata);
    }
}
