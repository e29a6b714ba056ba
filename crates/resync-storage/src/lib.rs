//! System-of-record storage for the resync system.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for items, collections, membership and leases
//! - Atomic writes via WriteBatch (item + membership, cascading collection delete)
//! - Existence checks and full item fetches for index re-derivation
//! - Expiring run leases keyed by job name

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod lease;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{CollectionKey, ItemKey, LeaseKey, MembershipKey};
pub use lease::LeaseRecord;
