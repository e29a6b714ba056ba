//! Staleness policy.

use chrono::{DateTime, Duration, Utc};

use resync_types::IndexEntry;

/// True once `entry` has gone `time_until_reindex` without a write.
///
/// Younger entries may belong to a transaction that has not committed yet
/// and must be left alone. An entry stamped in the future is never stale.
pub fn is_stale(entry: &IndexEntry, now: DateTime<Utc>, time_until_reindex: Duration) -> bool {
    entry.age(now) >= time_until_reindex
}
