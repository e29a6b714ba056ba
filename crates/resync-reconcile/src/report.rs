//! Per-run reconciliation report.

use serde::Serialize;

/// Overall result of one run, for exit statuses and job history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every examined entry was handled
    Success,
    /// Some entries errored; they are retried next run
    PartialFailure,
    /// A pass aborted, or no attempted entry could be handled at all
    HardFailure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::PartialFailure => "partial_failure",
            RunOutcome::HardFailure => "hard_failure",
        }
    }
}

/// What happened to a single examined entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Provisional entry re-derived and marked confirmed
    Promoted,
    /// Entry removed because its record is gone
    Purged,
    /// Inside the grace period
    SkippedFresh,
    /// Entry changed or vanished before the job acted on it
    AlreadyResolved,
    /// Confirmed entry whose record still exists
    Verified,
    /// Lookup or write failed; entry left untouched
    Failed,
}

impl EntryOutcome {
    /// Whether the outcome wrote to the index.
    pub fn mutated(&self) -> bool {
        matches!(self, EntryOutcome::Promoted | EntryOutcome::Purged)
    }
}

/// Counts and failures for one `run_once` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    /// Lease holder identity for this run
    pub run_id: String,
    pub dry_run: bool,
    /// Entries returned by page queries, across both passes
    pub scanned: usize,
    pub pages: usize,
    pub promoted: usize,
    /// Stale provisional entries with no record
    pub purged_provisional: usize,
    /// Confirmed entries with no record
    pub purged_confirmed: usize,
    pub skipped_fresh: usize,
    pub already_resolved: usize,
    pub verified: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub lease_lost: bool,
    /// One message per aborted pass
    pub pass_failures: Vec<String>,
    pub elapsed_ms: u64,
}

impl ReconciliationReport {
    pub fn new(run_id: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            dry_run,
            ..Default::default()
        }
    }

    /// Record one provisional-pass entry.
    pub fn record_provisional(&mut self, outcome: EntryOutcome) {
        self.scanned += 1;
        match outcome {
            EntryOutcome::Purged => self.purged_provisional += 1,
            other => self.record_common(other),
        }
    }

    /// Record one confirmed-orphan-pass entry.
    pub fn record_confirmed(&mut self, outcome: EntryOutcome) {
        self.scanned += 1;
        match outcome {
            EntryOutcome::Purged => self.purged_confirmed += 1,
            other => self.record_common(other),
        }
    }

    fn record_common(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Promoted => self.promoted += 1,
            EntryOutcome::SkippedFresh => self.skipped_fresh += 1,
            EntryOutcome::AlreadyResolved => self.already_resolved += 1,
            EntryOutcome::Verified => self.verified += 1,
            EntryOutcome::Failed => self.errors += 1,
            EntryOutcome::Purged => {}
        }
    }

    pub fn record_pass_failure(&mut self, pass: &str, reason: impl std::fmt::Display) {
        self.pass_failures.push(format!("{}: {}", pass, reason));
    }

    /// Total index entries deleted.
    pub fn purged(&self) -> usize {
        self.purged_provisional + self.purged_confirmed
    }

    /// Total index mutations (or would-be mutations in dry-run).
    pub fn repaired(&self) -> usize {
        self.promoted + self.purged()
    }

    pub fn outcome(&self) -> RunOutcome {
        if !self.pass_failures.is_empty() {
            return RunOutcome::HardFailure;
        }
        if self.errors == 0 {
            return RunOutcome::Success;
        }
        let attempted = self.scanned - self.skipped_fresh;
        if self.errors == attempted {
            RunOutcome::HardFailure
        } else {
            RunOutcome::PartialFailure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let mut report = ReconciliationReport::new("run-1", false);
        report.record_provisional(EntryOutcome::Promoted);
        report.record_provisional(EntryOutcome::Purged);
        report.record_provisional(EntryOutcome::SkippedFresh);
        report.record_confirmed(EntryOutcome::Purged);
        report.record_confirmed(EntryOutcome::Verified);

        assert_eq!(report.scanned, 5);
        assert_eq!(report.promoted, 1);
        assert_eq!(report.purged_provisional, 1);
        assert_eq!(report.purged_confirmed, 1);
        assert_eq!(report.purged(), 2);
        assert_eq!(report.repaired(), 3);
        assert_eq!(report.skipped_fresh, 1);
        assert_eq!(report.verified, 1);
        assert_eq!(report.outcome(), RunOutcome::Success);
    }

    #[test]
    fn test_partial_failure() {
        let mut report = ReconciliationReport::new("run-1", false);
        report.record_provisional(EntryOutcome::Promoted);
        report.record_provisional(EntryOutcome::Failed);
        assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    }

    #[test]
    fn test_every_attempt_failed_is_hard_failure() {
        let mut report = ReconciliationReport::new("run-1", false);
        report.record_provisional(EntryOutcome::SkippedFresh);
        report.record_provisional(EntryOutcome::Failed);
        report.record_confirmed(EntryOutcome::Failed);
        assert_eq!(report.outcome(), RunOutcome::HardFailure);
    }

    #[test]
    fn test_pass_failure_is_hard_failure() {
        let mut report = ReconciliationReport::new("run-1", false);
        report.record_provisional(EntryOutcome::Promoted);
        report.record_pass_failure("provisional", "index unreachable");
        assert_eq!(report.outcome(), RunOutcome::HardFailure);
        assert_eq!(report.pass_failures, vec!["provisional: index unreachable"]);
    }

    #[test]
    fn test_empty_run_is_success() {
        let report = ReconciliationReport::new("run-1", true);
        assert_eq!(report.outcome(), RunOutcome::Success);
        assert!(report.dry_run);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = ReconciliationReport::new("run-1", false);
        report.record_provisional(EntryOutcome::Promoted);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["promoted"], 1);
        assert_eq!(json["run_id"], "run-1");
    }
}
