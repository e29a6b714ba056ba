//! Background job scheduler for the index resync daemon.
//!
//! Wraps `tokio-cron-scheduler` with:
//!
//! - timezone-aware cron schedules via chrono-tz
//! - graceful shutdown: jobs receive a `CancellationToken` and shutdown
//!   waits for them to return
//! - skip-on-overlap, so a slow run is never stacked with the next tick
//! - random start jitter
//! - a [`JobRegistry`] with the last result and counters of each job
//!
//! # Example
//!
//! ```ignore
//! use resync_scheduler::{register_resync_job, SchedulerConfig, SchedulerService};
//!
//! let mut scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! register_resync_job(&scheduler, job, &settings.schedule).await?;
//! scheduler.start().await?;
//!
//! tokio::signal::ctrl_c().await?;
//! scheduler.shutdown().await?;
//! ```

mod config;
mod error;
mod jitter;
mod overlap;
mod registry;
mod scheduler;

#[cfg(feature = "jobs")]
pub mod jobs;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use jitter::JitterConfig;
pub use overlap::{OverlapGuard, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::SchedulerService;

#[cfg(feature = "jobs")]
pub use jobs::{register_resync_job, run_resync, RESYNC_JOB_NAME};
