//! # resync-search
//!
//! Tantivy-backed search index for archived items.
//!
//! Each document mirrors one system-of-record item and carries a status
//! marker: documents written before their transaction is known to have
//! committed are marked provisional, everything else is confirmed.
//!
//! ## Features
//! - Embedded Tantivy index with MmapDirectory for persistence; reopening
//!   checks the on-disk schema
//! - Upsert-by-id writes through a single shared writer
//! - Status-filtered paging in ascending id order over the `doc_id` fast
//!   column, with unreadable documents reported per page

pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod schema;
pub mod searcher;

pub use document::{doc_to_entry, index_document_to_doc};
pub use error::SearchError;
pub use index::{SearchIndex, SearchIndexConfig};
pub use indexer::SearchIndexer;
pub use schema::{build_item_schema, SearchSchema, PROVISIONAL_MARKER};
pub use searcher::EntrySearcher;
