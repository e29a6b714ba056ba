//! In-memory stores.
//!
//! Useful for embedding the job without RocksDB or Tantivy and for tests.
//! Each store can be told to fail specific calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{Duration, Utc};

use resync_storage::LeaseRecord;
use resync_types::{EntryPage, EntryStatus, IndexDocument, IndexEntry, ItemRecord};

use crate::error::ReconcileError;
use crate::store::{IndexStore, RunLease, SystemOfRecord};

fn poisoned<T>(err: std::sync::PoisonError<T>) -> ReconcileError {
    ReconcileError::Unavailable(format!("lock poisoned: {}", err))
}

type CommitHook = Box<dyn Fn(usize) + Send + Sync>;

/// Index store backed by an ordered map. Writes apply immediately.
#[derive(Default)]
pub struct InMemoryIndexStore {
    docs: RwLock<BTreeMap<String, IndexDocument>>,
    /// Ids that match status queries but cannot be read back
    unreadable: RwLock<BTreeMap<String, EntryStatus>>,
    commits: AtomicUsize,
    commit_hook: Mutex<Option<CommitHook>>,
    writes: Mutex<HashMap<String, usize>>,
    failing_queries: Mutex<HashSet<EntryStatus>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a write.
    pub fn insert(&self, document: IndexDocument) {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(document.id().to_string(), document);
        }
    }

    pub fn insert_entry(&self, entry: IndexEntry) {
        self.insert(IndexDocument::bare(entry));
    }

    /// Seed a document that status queries match but cannot decode.
    pub fn insert_unreadable(&self, id: &str, status: EntryStatus) {
        if let Ok(mut unreadable) = self.unreadable.write() {
            unreadable.insert(id.to_string(), status);
        }
    }

    /// Call `hook` with the running commit count after every commit.
    pub fn on_commit(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.commit_hook.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    pub fn entry(&self, id: &str) -> Option<IndexEntry> {
        self.document(id).map(|d| d.entry)
    }

    pub fn document(&self, id: &str) -> Option<IndexDocument> {
        self.docs.read().ok()?.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.document(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_status(&self, status: EntryStatus) -> usize {
        self.docs
            .read()
            .map(|d| d.values().filter(|doc| doc.entry.status == status).count())
            .unwrap_or(0)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Upserts plus deletes issued for an id.
    pub fn write_count(&self, id: &str) -> usize {
        self.writes
            .lock()
            .map(|w| w.get(id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Make every `query_by_status` for `status` fail.
    pub fn fail_queries_for(&self, status: EntryStatus) {
        if let Ok(mut failing) = self.failing_queries.lock() {
            failing.insert(status);
        }
    }

    /// Make upserts and deletes of `id` fail.
    pub fn fail_writes_for(&self, id: &str) {
        if let Ok(mut failing) = self.failing_writes.lock() {
            failing.insert(id.to_string());
        }
    }

    fn check_write(&self, id: &str) -> Result<(), ReconcileError> {
        if self.failing_writes.lock().map_err(poisoned)?.contains(id) {
            return Err(ReconcileError::Unavailable(format!("write rejected for {}", id)));
        }
        *self
            .writes
            .lock()
            .map_err(poisoned)?
            .entry(id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}

impl IndexStore for InMemoryIndexStore {
    fn query_by_status(
        &self,
        status: EntryStatus,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<EntryPage, ReconcileError> {
        if self.failing_queries.lock().map_err(poisoned)?.contains(&status) {
            return Err(ReconcileError::Unavailable(format!(
                "query for {} entries failed",
                status
            )));
        }

        let docs = self.docs.read().map_err(poisoned)?;
        let unreadable = self.unreadable.read().map_err(poisoned)?;
        let range = || {
            let lower = match after_id {
                Some(id) => Bound::Excluded(id),
                None => Bound::Unbounded,
            };
            (lower, Bound::Unbounded)
        };

        // id -> decoded entry, or None for an unreadable document
        let mut matched: BTreeMap<&str, Option<&IndexEntry>> = docs
            .range::<str, _>(range())
            .filter(|(_, doc)| doc.entry.status == status)
            .map(|(id, doc)| (id.as_str(), Some(&doc.entry)))
            .collect();
        matched.extend(
            unreadable
                .range::<str, _>(range())
                .filter(|(_, s)| **s == status)
                .map(|(id, _)| (id.as_str(), None)),
        );

        let mut page = EntryPage::default();
        for (id, entry) in matched.into_iter().take(limit) {
            match entry {
                Some(entry) => page.entries.push(entry.clone()),
                None => page.unreadable.push(id.to_string()),
            }
            page.last_id = Some(id.to_string());
        }
        Ok(page)
    }

    fn get(&self, id: &str) -> Result<Option<IndexEntry>, ReconcileError> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(id).map(|d| d.entry.clone()))
    }

    fn upsert(&self, document: &IndexDocument) -> Result<(), ReconcileError> {
        self.check_write(document.id())?;
        self.docs
            .write()
            .map_err(poisoned)?
            .insert(document.id().to_string(), document.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), ReconcileError> {
        self.check_write(id)?;
        self.docs.write().map_err(poisoned)?.remove(id);
        self.unreadable.write().map_err(poisoned)?.remove(id);
        Ok(())
    }

    fn commit(&self) -> Result<(), ReconcileError> {
        let count = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.commit_hook.lock().map_err(poisoned)?.as_ref() {
            hook(count);
        }
        Ok(())
    }
}

/// System of record backed by a map of items.
#[derive(Default)]
pub struct InMemorySystemOfRecord {
    items: RwLock<HashMap<String, ItemRecord>>,
    failing_ids: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemorySystemOfRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: ItemRecord) {
        if let Ok(mut items) = self.items.write() {
            items.insert(item.id.clone(), item);
        }
    }

    pub fn remove(&self, id: &str) -> Option<ItemRecord> {
        self.items.write().ok()?.remove(id)
    }

    /// Make lookups of `id` fail.
    pub fn fail_lookups_for(&self, id: &str) {
        if let Ok(mut failing) = self.failing_ids.lock() {
            failing.insert(id.to_string());
        }
    }

    /// Make every lookup fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `exists` calls served or refused.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check(&self, id: &str) -> Result<(), ReconcileError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReconcileError::Unavailable("system of record offline".to_string()));
        }
        if self.failing_ids.lock().map_err(poisoned)?.contains(id) {
            return Err(ReconcileError::Unavailable(format!("lookup failed for {}", id)));
        }
        Ok(())
    }
}

impl SystemOfRecord for InMemorySystemOfRecord {
    fn exists(&self, id: &str) -> Result<bool, ReconcileError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check(id)?;
        Ok(self.items.read().map_err(poisoned)?.contains_key(id))
    }

    fn fetch_for_indexing(&self, id: &str) -> Result<Option<ItemRecord>, ReconcileError> {
        self.check(id)?;
        Ok(self.items.read().map_err(poisoned)?.get(id).cloned())
    }
}

/// Process-local lease table.
#[derive(Default)]
pub struct InMemoryLease {
    leases: Mutex<HashMap<String, LeaseRecord>>,
    acquires: AtomicUsize,
    /// (acquire call number, holder) at which the lease changes hands
    hand_over: Mutex<Option<(usize, String)>>,
}

impl InMemoryLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a live lease, if any.
    pub fn holder(&self, job_name: &str) -> Option<String> {
        let leases = self.leases.lock().ok()?;
        leases
            .get(job_name)
            .filter(|l| !l.is_expired(Utc::now()))
            .map(|l| l.holder.clone())
    }

    /// Give every lease to `holder` just before the `call`-th
    /// `try_acquire`, as if another process took it over.
    pub fn hand_over_at(&self, call: usize, holder: &str) {
        if let Ok(mut slot) = self.hand_over.lock() {
            *slot = Some((call, holder.to_string()));
        }
    }
}

impl RunLease for InMemoryLease {
    fn try_acquire(
        &self,
        job_name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, ReconcileError> {
        let now = Utc::now();
        let call = self.acquires.fetch_add(1, Ordering::SeqCst) + 1;
        let mut leases = self.leases.lock().map_err(poisoned)?;
        if let Some((at, intruder)) = self.hand_over.lock().map_err(poisoned)?.as_ref() {
            if *at == call {
                leases.insert(
                    job_name.to_string(),
                    LeaseRecord::new(job_name, intruder, now, Duration::hours(1)),
                );
            }
        }
        if let Some(lease) = leases.get_mut(job_name) {
            if lease.is_held_by(holder) {
                lease.renew(now, ttl);
                return Ok(true);
            }
            if !lease.is_expired(now) {
                return Ok(false);
            }
        }
        leases.insert(
            job_name.to_string(),
            LeaseRecord::new(job_name, holder, now, ttl),
        );
        Ok(true)
    }

    fn release(&self, job_name: &str, holder: &str) -> Result<bool, ReconcileError> {
        let mut leases = self.leases.lock().map_err(poisoned)?;
        match leases.get(job_name) {
            Some(lease) if lease.is_held_by(holder) => {
                leases.remove(job_name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
