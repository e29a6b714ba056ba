//! Tantivy schema definition for the item index.
//!
//! Every document mirrors one system-of-record item. The `status` field is
//! only written for provisional entries; a document without it is confirmed.

use tantivy::schema::{Field, Schema, FAST, STORED, STRING, TEXT};

/// Marker written into the `status` field of provisional documents
pub const PROVISIONAL_MARKER: &str = "provisional";

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct SearchSchema {
    schema: Schema,

    /// Primary key: item id (STRING | STORED | FAST). The fast column
    /// orders and bounds status pages.
    pub doc_id: Field,

    /// Status marker, present only on provisional entries (STRING | STORED)
    pub status: Field,

    /// Last write time in milliseconds since the epoch (i64, STORED | FAST)
    pub last_modified_ms: Field,

    /// Item title (TEXT | STORED)
    pub title: Field,

    /// Searchable text: title, authors, subjects, issue date (TEXT)
    pub text: Field,

    /// Owning collection id (STRING | STORED)
    pub collection_id: Field,
}

impl SearchSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Build the item index schema.
pub fn build_item_schema() -> SearchSchema {
    let mut schema_builder = Schema::builder();

    let doc_id = schema_builder.add_text_field("doc_id", STRING | STORED | FAST);
    let status = schema_builder.add_text_field("status", STRING | STORED);
    let last_modified_ms = schema_builder.add_i64_field("last_modified_ms", STORED | FAST);
    let title = schema_builder.add_text_field("title", TEXT | STORED);
    let text = schema_builder.add_text_field("text", TEXT);
    let collection_id = schema_builder.add_text_field("collection_id", STRING | STORED);

    let schema = schema_builder.build();

    SearchSchema {
        schema,
        doc_id,
        status,
        last_modified_ms,
        title,
        text,
        collection_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schema() {
        let schema = build_item_schema();
        for name in [
            "doc_id",
            "status",
            "last_modified_ms",
            "title",
            "text",
            "collection_id",
        ] {
            assert!(schema.schema.get_field(name).is_ok(), "missing {}", name);
        }
    }

    #[test]
    fn test_paging_fields_are_fast() {
        let schema = build_item_schema();
        let fields = schema.schema();
        assert!(fields.get_field_entry(schema.doc_id).is_fast());
        assert!(fields.get_field_entry(schema.doc_id).is_indexed());
        assert!(fields.get_field_entry(schema.last_modified_ms).is_fast());
        assert!(!fields.get_field_entry(schema.status).is_fast());
    }
}
