//! End-to-end test infrastructure for index resync.
//!
//! Provides a TestHarness wiring a real RocksDB system of record and a real
//! Tantivy index the way the daemon does, plus helpers to seed both.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use resync_reconcile::{ReconciliationJob, TantivyIndexStore};
use resync_search::{EntrySearcher, SearchIndex, SearchIndexConfig, SearchIndexer};
use resync_storage::Storage;
use resync_types::{CollectionRecord, EntryStatus, IndexDocument, ItemRecord, ReconcileConfig};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub index: SearchIndex,
    /// The single index writer, shared by the "application" and the job
    pub indexer: Arc<SearchIndexer>,
    pub index_store: Arc<TantivyIndexStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(
            Storage::open(&temp_dir.path().join("db")).expect("Failed to open test storage"),
        );

        let index = SearchIndex::open_or_create(SearchIndexConfig::new(
            temp_dir.path().join("search-index"),
        ))
        .expect("Failed to open test index");
        let indexer = Arc::new(SearchIndexer::new(&index).expect("Failed to open index writer"));
        let index_store = Arc::new(
            TantivyIndexStore::new(&index, indexer.clone()).expect("Failed to open index store"),
        );

        Self {
            _temp_dir: temp_dir,
            storage,
            index,
            indexer,
            index_store,
        }
    }

    /// A reconciliation job over the harness stores.
    pub fn job(&self, config: ReconcileConfig) -> ReconciliationJob {
        ReconciliationJob::new(
            config,
            self.index_store.clone(),
            self.storage.clone(),
            self.storage.clone(),
        )
        .expect("Invalid reconcile config")
    }

    /// Searcher reloaded to see every commit so far.
    pub fn searcher(&self) -> &EntrySearcher {
        let searcher = self.index_store.searcher();
        searcher.reload().expect("Failed to reload searcher");
        searcher
    }

    pub fn count_by_status(&self, status: EntryStatus) -> usize {
        self.searcher()
            .count_by_status(status)
            .expect("Failed to count by status")
    }

    pub fn count_by_id(&self, id: &str) -> usize {
        self.searcher()
            .count_by_id(id)
            .expect("Failed to count by id")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Store a collection with `count` items in the system of record.
pub fn create_collection(
    storage: &Storage,
    name: &str,
    count: usize,
) -> (CollectionRecord, Vec<ItemRecord>) {
    let collection = CollectionRecord::new(name);
    storage
        .put_collection(&collection)
        .expect("Failed to put collection");

    let items: Vec<ItemRecord> = (0..count)
        .map(|i| {
            ItemRecord::new(&collection.id, format!("{} item {}", name, i))
                .with_author("Doe, Jane")
                .with_subject("reconciliation")
        })
        .collect();
    for item in &items {
        storage.put_item(item).expect("Failed to put item");
    }

    (collection, items)
}

/// Index items the way the application write path does before its
/// transaction commits, and commit the index.
pub fn index_items(
    indexer: &SearchIndexer,
    items: &[ItemRecord],
    status: EntryStatus,
    written_at: DateTime<Utc>,
) {
    for item in items {
        indexer
            .upsert(&IndexDocument::from_record(item, status, written_at))
            .expect("Failed to index item");
    }
    indexer.commit().expect("Failed to commit index");
}
