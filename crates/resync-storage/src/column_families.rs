//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - items: system-of-record items, keyed by item id
//! - collections: owning collections, keyed by collection id
//! - collection_items: membership index for cascading deletes
//! - leases: run leases keyed by job name

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for items
pub const CF_ITEMS: &str = "items";

/// Column family name for collections
pub const CF_COLLECTIONS: &str = "collections";

/// Column family name for collection -> item membership
pub const CF_COLLECTION_ITEMS: &str = "collection_items";

/// Column family name for job run leases
pub const CF_LEASES: &str = "leases";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_ITEMS, CF_COLLECTIONS, CF_COLLECTION_ITEMS, CF_LEASES];

/// Create column family options for items (compressed JSON records)
fn items_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_ITEMS, items_options()),
        ColumnFamilyDescriptor::new(CF_COLLECTIONS, Options::default()),
        ColumnFamilyDescriptor::new(CF_COLLECTION_ITEMS, Options::default()),
        ColumnFamilyDescriptor::new(CF_LEASES, Options::default()),
    ]
}
