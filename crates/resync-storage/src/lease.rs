//! Run lease records.
//!
//! A lease marks one holder as the active runner of a named job until it is
//! released or `expires_at` passes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Persisted lease for a named job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub job_name: String,
    /// Opaque identity of the current holder (one per run)
    pub holder: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn new(
        job_name: impl Into<String>,
        holder: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            holder: holder.into(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.holder == holder
    }

    /// Push the expiry out to `now + ttl`, keeping the original acquisition time.
    pub fn renew(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = now + ttl;
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_expiry() {
        let now = Utc::now();
        let lease = LeaseRecord::new("job", "run-1", now, Duration::seconds(10));
        assert!(!lease.is_expired(now));
        assert!(!lease.is_expired(now + Duration::seconds(9)));
        assert!(lease.is_expired(now + Duration::seconds(10)));
        assert!(lease.is_held_by("run-1"));
        assert!(!lease.is_held_by("run-2"));
    }

    #[test]
    fn test_lease_renew_keeps_acquired_at() {
        let now = Utc::now();
        let mut lease = LeaseRecord::new("job", "run-1", now, Duration::seconds(10));
        let later = now + Duration::seconds(8);
        lease.renew(later, Duration::seconds(10));
        assert_eq!(lease.acquired_at, now);
        assert_eq!(lease.expires_at, later + Duration::seconds(10));
    }
}
