//! RocksDB wrapper for the system of record.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Atomic item writes (item + collection membership)
//! - Cascading collection deletes
//! - Existence checks and item fetches
//! - Expiring run leases keyed by job name

use chrono::{DateTime, Duration, Utc};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use resync_types::{CollectionRecord, ItemRecord};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_COLLECTIONS, CF_COLLECTION_ITEMS, CF_ITEMS, CF_LEASES,
};
use crate::error::StorageError;
use crate::keys::{CollectionKey, ItemKey, LeaseKey, MembershipKey};
use crate::lease::LeaseRecord;

/// Main storage interface for the system of record
pub struct Storage {
    db: DB,
    /// Serializes lease read-modify-write cycles within this process.
    /// RocksDB's own LOCK file keeps other processes out of the database.
    lease_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            lease_lock: Mutex::new(()),
        })
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Collection Methods ====================

    /// Store a collection record.
    pub fn put_collection(&self, collection: &CollectionRecord) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_COLLECTIONS)?;
        let key = CollectionKey::new(&collection.id);
        self.db.put_cf(cf, key.to_bytes(), collection.to_bytes()?)?;
        debug!(collection_id = %collection.id, "Stored collection");
        Ok(())
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<Option<CollectionRecord>, StorageError> {
        let cf = self.cf_handle(CF_COLLECTIONS)?;
        let key = CollectionKey::new(collection_id);
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(CollectionRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a collection together with every item it owns.
    ///
    /// Returns the number of items deleted. Index entries for those items
    /// are left untouched; repairing them is the reconciliation job's work.
    pub fn delete_collection(&self, collection_id: &str) -> Result<usize, StorageError> {
        let collections_cf = self.cf_handle(CF_COLLECTIONS)?;
        let items_cf = self.cf_handle(CF_ITEMS)?;
        let members_cf = self.cf_handle(CF_COLLECTION_ITEMS)?;

        let prefix = MembershipKey::prefix(collection_id);
        let iter = self
            .db
            .iterator_cf(members_cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut batch = WriteBatch::default();
        let mut count = 0;

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let member = MembershipKey::from_bytes(&key)?;
            batch.delete_cf(items_cf, ItemKey::new(&member.item_id).to_bytes());
            batch.delete_cf(members_cf, &key);
            count += 1;
        }

        batch.delete_cf(collections_cf, CollectionKey::new(collection_id).to_bytes());
        self.db.write(batch)?;

        info!(collection_id, items = count, "Deleted collection");
        Ok(count)
    }

    // ==================== Item Methods ====================

    /// Store an item and its collection membership atomically.
    pub fn put_item(&self, item: &ItemRecord) -> Result<(), StorageError> {
        let items_cf = self.cf_handle(CF_ITEMS)?;
        let members_cf = self.cf_handle(CF_COLLECTION_ITEMS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(items_cf, ItemKey::new(&item.id).to_bytes(), item.to_bytes()?);
        batch.put_cf(
            members_cf,
            MembershipKey::new(&item.collection_id, &item.id).to_bytes(),
            b"",
        );
        self.db.write(batch)?;

        debug!(item_id = %item.id, collection_id = %item.collection_id, "Stored item");
        Ok(())
    }

    /// Get an item by id.
    pub fn get_item(&self, item_id: &str) -> Result<Option<ItemRecord>, StorageError> {
        let cf = self.cf_handle(CF_ITEMS)?;
        match self.db.get_cf(cf, ItemKey::new(item_id).to_bytes())? {
            Some(bytes) => Ok(Some(ItemRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check whether an item exists without decoding it.
    pub fn item_exists(&self, item_id: &str) -> Result<bool, StorageError> {
        let cf = self.cf_handle(CF_ITEMS)?;
        Ok(self
            .db
            .get_pinned_cf(cf, ItemKey::new(item_id).to_bytes())?
            .is_some())
    }

    /// Delete an item and its membership entry.
    ///
    /// Returns false if the item did not exist.
    pub fn delete_item(&self, item_id: &str) -> Result<bool, StorageError> {
        let Some(item) = self.get_item(item_id)? else {
            return Ok(false);
        };

        let items_cf = self.cf_handle(CF_ITEMS)?;
        let members_cf = self.cf_handle(CF_COLLECTION_ITEMS)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(items_cf, ItemKey::new(item_id).to_bytes());
        batch.delete_cf(
            members_cf,
            MembershipKey::new(&item.collection_id, item_id).to_bytes(),
        );
        self.db.write(batch)?;

        debug!(item_id, "Deleted item");
        Ok(true)
    }

    // ==================== Lease Methods ====================

    /// Try to take (or renew) the lease for `job_name`.
    ///
    /// Succeeds when no lease exists, the existing lease has expired, or
    /// `holder` already owns it. Returns false when another holder owns a
    /// live lease.
    pub fn try_acquire_lease(
        &self,
        job_name: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let _guard = self
            .lease_lock
            .lock()
            .map_err(|e| StorageError::LeaseLock(e.to_string()))?;

        let cf = self.cf_handle(CF_LEASES)?;
        let key = LeaseKey::new(job_name).to_bytes();

        let lease = match self.db.get_cf(cf, &key)? {
            Some(bytes) => {
                let mut existing = LeaseRecord::from_bytes(&bytes)?;
                if existing.is_held_by(holder) {
                    existing.renew(now, ttl);
                    existing
                } else if existing.is_expired(now) {
                    info!(
                        job_name,
                        previous_holder = %existing.holder,
                        "Taking over expired lease"
                    );
                    LeaseRecord::new(job_name, holder, now, ttl)
                } else {
                    debug!(job_name, holder = %existing.holder, "Lease held by another run");
                    return Ok(false);
                }
            }
            None => LeaseRecord::new(job_name, holder, now, ttl),
        };

        self.db.put_cf(cf, &key, lease.to_bytes()?)?;
        Ok(true)
    }

    /// Release the lease if `holder` owns it. Returns whether it was released.
    pub fn release_lease(&self, job_name: &str, holder: &str) -> Result<bool, StorageError> {
        let _guard = self
            .lease_lock
            .lock()
            .map_err(|e| StorageError::LeaseLock(e.to_string()))?;

        let cf = self.cf_handle(CF_LEASES)?;
        let key = LeaseKey::new(job_name).to_bytes();

        match self.db.get_cf(cf, &key)? {
            Some(bytes) if LeaseRecord::from_bytes(&bytes)?.is_held_by(holder) => {
                self.db.delete_cf(cf, &key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn get_lease(&self, job_name: &str) -> Result<Option<LeaseRecord>, StorageError> {
        let cf = self.cf_handle(CF_LEASES)?;
        match self.db.get_cf(cf, LeaseKey::new(job_name).to_bytes())? {
            Some(bytes) => Ok(Some(LeaseRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    // ==================== Maintenance ====================

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            item_count: self.count_cf_entries(self.cf_handle(CF_ITEMS)?)?,
            collection_count: self.count_cf_entries(self.cf_handle(CF_COLLECTIONS)?)?,
            lease_count: self.count_cf_entries(self.cf_handle(CF_LEASES)?)?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of items stored
    pub item_count: u64,
    /// Number of collections stored
    pub collection_count: u64,
    /// Number of lease records (live or expired)
    pub lease_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
