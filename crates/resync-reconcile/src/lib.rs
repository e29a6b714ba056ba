//! # resync-reconcile
//!
//! Repairs divergence between the search index and the system of record.
//!
//! Index writes are not part of the database transaction, so an entry can be
//! indexed before its row commits (or without the row ever committing), and a
//! row can be deleted while its entry stays indexed. [`ReconciliationJob`]
//! promotes stale provisional entries whose record exists, purges entries
//! whose record is gone, and reports what it did.
//!
//! ## Components
//! - [`store`]: `IndexStore`, `SystemOfRecord` and `RunLease` ports
//! - [`adapters`]: the ports over Tantivy and RocksDB
//! - [`memory`]: in-memory stores
//! - [`staleness`]: grace-period predicate
//! - [`job`]: the two-pass run loop
//! - [`report`]: per-run counts and outcome

pub mod adapters;
pub mod error;
pub mod job;
pub mod memory;
pub mod report;
pub mod staleness;
pub mod store;

pub use adapters::TantivyIndexStore;
pub use error::ReconcileError;
pub use job::{ReconciliationJob, RESYNC_JOB_NAME};
pub use memory::{InMemoryIndexStore, InMemoryLease, InMemorySystemOfRecord};
pub use report::{EntryOutcome, ReconciliationReport, RunOutcome};
pub use staleness::is_stale;
pub use store::{IndexStore, RunLease, SystemOfRecord};
