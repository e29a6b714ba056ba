//! Per-job run history.
//!
//! The scheduler records every tick of every registered job here: when it
//! started, how long it took, whether it succeeded, failed or was skipped,
//! and whatever counters the job reported.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Job failed with an error message
    Failed(String),
    /// Job did not run (previous run still going, lease held elsewhere, ...)
    Skipped(String),
}

/// What a job hands back to the scheduler on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    /// Counters and labels from the run, shown by `status`.
    pub metadata: HashMap<String, String>,
    /// Set when the job decided not to do any work.
    pub skipped: Option<String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// An output for a run that was deliberately not performed.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    /// When the job last started (if ever)
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// Completed runs, skipped ticks excluded
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: impl Into<String>, cron_expr: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            cron_expr: cron_expr.into(),
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe map of job name to [`JobStatus`].
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking job must not make the history unreadable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a job. Re-registering keeps history and updates the schedule.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.write()
            .entry(job_name.to_string())
            .and_modify(|status| status.cron_expr = cron_expr.to_string())
            .or_insert_with(|| JobStatus::new(job_name, cron_expr));
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
            status.last_run = Some(Utc::now());
        }
    }

    /// Record the end of a run. Skips do not count as runs.
    pub fn record_complete(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        let mut jobs = self.write();
        let Some(status) = jobs.get_mut(job_name) else {
            return;
        };
        status.is_running = false;
        status.last_duration_ms = Some(duration_ms);
        match &result {
            JobResult::Success => status.run_count += 1,
            JobResult::Failed(_) => {
                status.run_count += 1;
                status.error_count += 1;
            }
            JobResult::Skipped(_) => status.skip_count += 1,
        }
        status.last_result = Some(result);
        status.last_run_metadata = metadata;
    }

    /// Record a tick that was skipped before the job started. The state of
    /// a run already in progress is left alone.
    pub fn record_skip(&self, job_name: &str, reason: impl Into<String>) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.skip_count += 1;
            status.last_result = Some(JobResult::Skipped(reason.into()));
        }
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// All statuses, sorted by job name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|status| status.is_running)
            .unwrap_or(false)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}
