//! Random start delay for scheduled runs.
//!
//! Several daemons sharing one system of record would otherwise all fire on
//! the same cron tick and contend for the run lease.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Maximum random delay applied before a scheduled run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JitterConfig {
    /// Maximum jitter in seconds (0 = no jitter)
    pub max_jitter_secs: u64,
}

impl JitterConfig {
    pub fn new(max_jitter_secs: u64) -> Self {
        Self { max_jitter_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// A delay in `[0, max_jitter_secs)` with millisecond resolution.
    pub fn generate_jitter(&self) -> Duration {
        if self.max_jitter_secs == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..self.max_jitter_secs * 1000);
        Duration::from_millis(jitter_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_jitter_secs > 0
    }

    /// Sleep for a random jitter. Returns `false` if `cancel` fired first.
    pub async fn delay(&self, cancel: &CancellationToken) -> bool {
        let delay = self.generate_jitter();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        debug!(jitter_ms = delay.as_millis() as u64, "Applying jitter delay");
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
