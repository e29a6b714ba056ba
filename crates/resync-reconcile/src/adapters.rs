//! Store ports implemented over the Tantivy index and RocksDB storage.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use resync_search::{EntrySearcher, SearchIndex, SearchIndexer};
use resync_storage::Storage;
use resync_types::{EntryPage, EntryStatus, IndexDocument, IndexEntry, ItemRecord};

use crate::error::ReconcileError;
use crate::store::{IndexStore, RunLease, SystemOfRecord};

/// [`IndexStore`] over a Tantivy index.
///
/// Shares its [`SearchIndexer`] with the application write path, since an
/// index accepts a single writer. Reads reload before each page so commits
/// from other writers are seen.
pub struct TantivyIndexStore {
    indexer: Arc<SearchIndexer>,
    searcher: EntrySearcher,
}

impl TantivyIndexStore {
    pub fn new(index: &SearchIndex, indexer: Arc<SearchIndexer>) -> Result<Self, ReconcileError> {
        Ok(Self {
            indexer,
            searcher: EntrySearcher::new(index)?,
        })
    }

    /// Searcher used by this store, for status reporting.
    pub fn searcher(&self) -> &EntrySearcher {
        &self.searcher
    }
}

impl IndexStore for TantivyIndexStore {
    fn query_by_status(
        &self,
        status: EntryStatus,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<EntryPage, ReconcileError> {
        self.searcher.reload()?;
        Ok(self.searcher.query_by_status(status, after_id, limit)?)
    }

    fn get(&self, id: &str) -> Result<Option<IndexEntry>, ReconcileError> {
        Ok(self.searcher.get(id)?)
    }

    fn upsert(&self, document: &IndexDocument) -> Result<(), ReconcileError> {
        Ok(self.indexer.upsert(document)?)
    }

    fn delete(&self, id: &str) -> Result<(), ReconcileError> {
        Ok(self.indexer.delete_document(id)?)
    }

    fn commit(&self) -> Result<(), ReconcileError> {
        self.indexer.commit()?;
        self.searcher.reload()?;
        Ok(())
    }
}

impl SystemOfRecord for Storage {
    fn exists(&self, id: &str) -> Result<bool, ReconcileError> {
        Ok(self.item_exists(id)?)
    }

    fn fetch_for_indexing(&self, id: &str) -> Result<Option<ItemRecord>, ReconcileError> {
        Ok(self.get_item(id)?)
    }
}

impl RunLease for Storage {
    fn try_acquire(
        &self,
        job_name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, ReconcileError> {
        let acquired = self.try_acquire_lease(job_name, holder, Utc::now(), ttl)?;
        debug!(job_name, holder, acquired, "Lease acquire attempt");
        Ok(acquired)
    }

    fn release(&self, job_name: &str, holder: &str) -> Result<bool, ReconcileError> {
        Ok(self.release_lease(job_name, holder)?)
    }
}
