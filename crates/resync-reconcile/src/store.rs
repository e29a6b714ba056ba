//! Ports between the reconciliation job and the stores it repairs.
//!
//! All methods are blocking; the job drives them from
//! `tokio::task::spawn_blocking`.

use chrono::Duration;

use resync_types::{EntryPage, EntryStatus, IndexDocument, IndexEntry, ItemRecord};

use crate::error::ReconcileError;

/// The derived search index.
pub trait IndexStore: Send + Sync {
    /// Documents with `status` whose id sorts strictly after `after_id`,
    /// in ascending id order, at most `limit` of them. Documents that match
    /// but cannot be decoded are listed in [`EntryPage::unreadable`].
    fn query_by_status(
        &self,
        status: EntryStatus,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<EntryPage, ReconcileError>;

    /// Current entry for an id.
    fn get(&self, id: &str) -> Result<Option<IndexEntry>, ReconcileError>;

    /// Write a document, replacing any document with the same id.
    fn upsert(&self, document: &IndexDocument) -> Result<(), ReconcileError>;

    /// Remove the document for an id. Deleting a missing id is a no-op.
    fn delete(&self, id: &str) -> Result<(), ReconcileError>;

    /// Make pending writes durable and visible.
    fn commit(&self) -> Result<(), ReconcileError>;
}

/// The authoritative store. Never mutated by the job.
pub trait SystemOfRecord: Send + Sync {
    fn exists(&self, id: &str) -> Result<bool, ReconcileError>;

    /// Load the entity an index document is derived from.
    fn fetch_for_indexing(&self, id: &str) -> Result<Option<ItemRecord>, ReconcileError>;
}

/// Run-level mutual exclusion keyed by job name.
pub trait RunLease: Send + Sync {
    /// Take or renew the lease. Returns false if another holder owns a
    /// live lease.
    fn try_acquire(&self, job_name: &str, holder: &str, ttl: Duration)
        -> Result<bool, ReconcileError>;

    /// Give the lease up. Returns false if `holder` did not own it.
    fn release(&self, job_name: &str, holder: &str) -> Result<bool, ReconcileError>;
}
