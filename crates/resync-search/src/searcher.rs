//! Read side of the item index.
//!
//! Status-filtered paging for reconciliation, plus id lookups and counts.

use std::ops::Bound;

use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{IndexReader, Order, TantivyDocument, Term};
use tracing::{debug, warn};

use resync_types::{EntryPage, EntryStatus, IndexEntry};

use crate::document::doc_to_entry;
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::{SearchSchema, PROVISIONAL_MARKER};

/// Reader over the item index.
pub struct EntrySearcher {
    reader: IndexReader,
    schema: SearchSchema,
}

impl EntrySearcher {
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        Ok(Self {
            reader: index.reader()?,
            schema: index.schema().clone(),
        })
    }

    /// Reload the reader to see recent commits.
    pub fn reload(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        debug!("Reloaded search reader");
        Ok(())
    }

    fn status_query(&self, status: EntryStatus) -> Box<dyn Query> {
        let provisional = TermQuery::new(
            Term::from_field_text(self.schema.status, PROVISIONAL_MARKER),
            IndexRecordOption::Basic,
        );
        match status {
            EntryStatus::Provisional => Box::new(provisional),
            // No marker, or any marker other than provisional
            EntryStatus::Confirmed => Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, Box::new(provisional) as Box<dyn Query>),
            ])),
        }
    }

    fn id_query(&self, id: &str) -> TermQuery {
        TermQuery::new(
            Term::from_field_text(self.schema.doc_id, id),
            IndexRecordOption::Basic,
        )
    }

    /// Page through entries with the given status in ascending id order.
    ///
    /// Matches at most `limit` documents whose id sorts strictly after
    /// `after_id`, read in id order from the `doc_id` fast column. A matched
    /// document that cannot be decoded lands in [`EntryPage::unreadable`];
    /// resuming from [`EntryPage::last_id`] visits every matching document
    /// exactly once.
    pub fn query_by_status(
        &self,
        status: EntryStatus,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<EntryPage, SearchError> {
        if limit == 0 {
            return Ok(EntryPage::default());
        }

        let query = match after_id {
            Some(after) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, self.status_query(status)),
                (
                    Occur::Must,
                    Box::new(RangeQuery::new(
                        Bound::Excluded(Term::from_field_text(self.schema.doc_id, after)),
                        Bound::Unbounded,
                    )) as Box<dyn Query>,
                ),
            ])) as Box<dyn Query>,
            None => self.status_query(status),
        };

        let searcher = self.reader.searcher();
        let collector = TopDocs::with_limit(limit).order_by_string_fast_field("doc_id", Order::Asc);
        let hits = searcher.search(&query, &collector)?;

        let mut page = EntryPage::default();
        for (doc_id, address) in hits {
            let doc: TantivyDocument = searcher.doc(address)?;
            match doc_to_entry(&self.schema, &doc) {
                Ok(entry) => page.entries.push(entry),
                Err(e) => {
                    warn!(doc_id = %doc_id, error = %e, "Unreadable index document");
                    page.unreadable.push(doc_id.clone());
                }
            }
            page.last_id = Some(doc_id);
        }

        debug!(
            status = %status,
            after = ?after_id,
            returned = page.entries.len(),
            unreadable = page.unreadable.len(),
            "Queried entries by status"
        );
        Ok(page)
    }

    /// Count entries with the given status.
    pub fn count_by_status(&self, status: EntryStatus) -> Result<usize, SearchError> {
        let searcher = self.reader.searcher();
        Ok(searcher.search(&self.status_query(status), &Count)?)
    }

    /// Number of documents carrying the given id.
    pub fn count_by_id(&self, id: &str) -> Result<usize, SearchError> {
        let searcher = self.reader.searcher();
        Ok(searcher.search(&self.id_query(id), &Count)?)
    }

    /// Fetch the entry for an id, if present.
    pub fn get(&self, id: &str) -> Result<Option<IndexEntry>, SearchError> {
        let searcher = self.reader.searcher();
        let addresses = searcher.search(&self.id_query(id), &DocSetCollector)?;

        match addresses.into_iter().next() {
            Some(address) => {
                let doc: TantivyDocument = searcher.doc(address)?;
                Ok(Some(doc_to_entry(&self.schema, &doc)?))
            }
            None => Ok(None),
        }
    }

    /// Total number of live documents.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
