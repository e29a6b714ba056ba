//! Search indexer for writing documents to the Tantivy index.
//!
//! The indexer wraps IndexWriter with shared access via Arc<Mutex>.
//! Changes are not visible until commit() is called.

use std::sync::{Arc, Mutex};

use tantivy::{IndexWriter, Term};
use tracing::{debug, info};

use resync_types::IndexDocument;

use crate::document::index_document_to_doc;
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::SearchSchema;

/// Manages document write operations.
///
/// One indexer per index: application writes and reconciliation share it.
pub struct SearchIndexer {
    writer: Arc<Mutex<IndexWriter>>,
    schema: SearchSchema,
}

impl SearchIndexer {
    /// Create a new indexer from a SearchIndex.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        let writer = index.writer()?;
        let schema = index.schema().clone();

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            schema,
        })
    }

    /// Write a document, replacing any existing document with the same id.
    pub fn upsert(&self, document: &IndexDocument) -> Result<(), SearchError> {
        let doc = index_document_to_doc(&self.schema, document);

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let term = Term::from_field_text(self.schema.doc_id, document.id());
        writer.delete_term(term);
        writer.add_document(doc)?;

        debug!(
            doc_id = %document.id(),
            status = %document.entry.status,
            "Indexed document"
        );
        Ok(())
    }

    /// Delete every document with the given id.
    pub fn delete_document(&self, doc_id: &str) -> Result<(), SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let term = Term::from_field_text(self.schema.doc_id, doc_id);
        writer.delete_term(term);

        debug!(doc_id, "Deleted document");
        Ok(())
    }

    /// Commit pending changes to make them searchable.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.commit()?;
        info!(opstamp, "Committed index changes");
        Ok(opstamp)
    }
}
