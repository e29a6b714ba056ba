//! Job definitions registered by the daemon.

pub mod resync;

pub use resync::{register_resync_job, run_resync, RESYNC_JOB_NAME};
