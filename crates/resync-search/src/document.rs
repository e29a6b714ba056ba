//! Mapping between index documents and Tantivy documents.

use chrono::DateTime;
use tantivy::doc;
use tantivy::schema::Value;
use tantivy::TantivyDocument;

use resync_types::{EntryStatus, IndexDocument, IndexEntry};

use crate::error::SearchError;
use crate::schema::{SearchSchema, PROVISIONAL_MARKER};

/// Convert an [`IndexDocument`] to a Tantivy document.
///
/// Confirmed documents carry no status field.
pub fn index_document_to_doc(schema: &SearchSchema, document: &IndexDocument) -> TantivyDocument {
    let mut doc = doc!(
        schema.doc_id => document.entry.id.clone(),
        schema.last_modified_ms => document.entry.last_modified_ms(),
        schema.title => document.title.clone(),
        schema.text => document.text.clone()
    );

    if document.entry.is_provisional() {
        doc.add_text(schema.status, PROVISIONAL_MARKER);
    }
    if let Some(collection_id) = &document.collection_id {
        doc.add_text(schema.collection_id, collection_id);
    }

    doc
}

/// Read the [`IndexEntry`] projection out of a stored Tantivy document.
///
/// The status marker never fails the read: anything but the provisional
/// marker is confirmed. A missing id or timestamp does.
pub fn doc_to_entry(schema: &SearchSchema, doc: &TantivyDocument) -> Result<IndexEntry, SearchError> {
    let doc_id = doc
        .get_first(schema.doc_id)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| SearchError::InvalidDocument {
            doc_id: String::new(),
            reason: "missing doc_id".to_string(),
        })?;

    let status = EntryStatus::from_marker(doc.get_first(schema.status).and_then(|v| v.as_str()));

    let millis = doc
        .get_first(schema.last_modified_ms)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| SearchError::InvalidDocument {
            doc_id: doc_id.clone(),
            reason: "missing last_modified_ms".to_string(),
        })?;
    let last_modified =
        DateTime::from_timestamp_millis(millis).ok_or_else(|| SearchError::InvalidDocument {
            doc_id: doc_id.clone(),
            reason: format!("last_modified_ms out of range: {}", millis),
        })?;

    Ok(IndexEntry::new(doc_id, status, last_modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_item_schema;
    use chrono::Utc;
    use resync_types::ItemRecord;

    #[test]
    fn test_provisional_document_carries_marker() {
        let schema = build_item_schema();
        let item = ItemRecord::new("col-1", "Public item 1").with_author("Smith, Donald");
        let document = IndexDocument::from_record(&item, EntryStatus::Provisional, Utc::now());

        let doc = index_document_to_doc(&schema, &document);
        let marker = doc.get_first(schema.status).and_then(|v| v.as_str());
        assert_eq!(marker, Some(PROVISIONAL_MARKER));

        let entry = doc_to_entry(&schema, &doc).unwrap();
        assert_eq!(entry.id, item.id);
        assert_eq!(entry.status, EntryStatus::Provisional);
        assert_eq!(entry.last_modified_ms(), document.entry.last_modified_ms());
    }

    #[test]
    fn test_confirmed_document_has_no_marker() {
        let schema = build_item_schema();
        let document = IndexDocument::bare(IndexEntry::confirmed("item-1"));

        let doc = index_document_to_doc(&schema, &document);
        assert!(doc.get_first(schema.status).is_none());
        assert!(doc.get_first(schema.collection_id).is_none());

        let entry = doc_to_entry(&schema, &doc).unwrap();
        assert_eq!(entry.status, EntryStatus::Confirmed);
    }

    #[test]
    fn test_unknown_marker_reads_as_confirmed() {
        let schema = build_item_schema();
        let doc = doc!(
            schema.doc_id => "item-1",
            schema.status => "pending",
            schema.last_modified_ms => 0i64
        );
        let entry = doc_to_entry(&schema, &doc).unwrap();
        assert_eq!(entry.id, "item-1");
        assert_eq!(entry.status, EntryStatus::Confirmed);
        assert_eq!(entry.last_modified_ms(), 0);
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let schema = build_item_schema();
        let doc = doc!(schema.doc_id => "item-1");
        let err = doc_to_entry(&schema, &doc).unwrap_err();
        assert!(matches!(err, SearchError::InvalidDocument { ref doc_id, .. } if doc_id == "item-1"));
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let schema = build_item_schema();
        let doc = doc!(
            schema.doc_id => "item-1",
            schema.last_modified_ms => i64::MAX
        );
        assert!(doc_to_entry(&schema, &doc).is_err());
    }
}
