//! # resync-types
//!
//! Shared domain types for the index/database resync system.
//!
//! This crate defines the data structures every other crate speaks:
//! - Entries: the minimal projection of a search-index document
//!   (identity, status marker, last-modified timestamp)
//! - Records: system-of-record entities (items and their owning collections)
//! - Settings: layered configuration, including the reconciliation thresholds
//!
//! ## Usage
//!
//! ```rust
//! use resync_types::{EntryStatus, IndexEntry};
//!
//! let entry = IndexEntry::provisional("01HN4QXKN6YWXVKZ3JMHP4BCDE");
//! assert_eq!(entry.status, EntryStatus::Provisional);
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod record;

pub use config::{ReconcileConfig, ScheduleSettings, Settings};
pub use entry::{EntryPage, EntryStatus, IndexDocument, IndexEntry};
pub use error::ResyncError;
pub use record::{CollectionRecord, ItemRecord};
