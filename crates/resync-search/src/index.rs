//! The on-disk item index.
//!
//! One directory holds one index built from [`build_item_schema`]. Opening a
//! directory written with any other schema fails with `SchemaMismatch`, since
//! status paging depends on the fast `doc_id` column.

use std::fs;
use std::path::{Path, PathBuf};

use tantivy::schema::Schema;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{build_item_schema, SearchSchema};

const DEFAULT_WRITER_MEMORY_MB: usize = 50;

#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub index_path: PathBuf,
    /// Indexing buffer for the single writer
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_writer_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

/// An opened item index and its field handles.
pub struct SearchIndex {
    index: Index,
    schema: SearchSchema,
    config: SearchIndexConfig,
}

impl SearchIndex {
    /// Open the index at the configured path, creating it if the directory
    /// holds none yet.
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let expected = build_item_schema();
        let path = &config.index_path;

        let index = if path.join("meta.json").exists() {
            let index = Index::open_in_dir(path)?;
            check_schema(path, &index.schema(), expected.schema())?;
            info!(path = ?path, "Opened item index");
            index
        } else {
            fs::create_dir_all(path)?;
            let index = Index::create_in_dir(path, expected.schema().clone())?;
            info!(path = ?path, "Created item index");
            index
        };

        Ok(Self {
            index,
            schema: expected,
            config,
        })
    }

    pub fn schema(&self) -> &SearchSchema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    /// Tantivy accepts one writer per index; share the result through
    /// [`crate::SearchIndexer`].
    pub(crate) fn writer(&self) -> Result<IndexWriter, SearchError> {
        let writer = self.index.writer(self.config.writer_memory_mb * 1024 * 1024)?;
        debug!(memory_mb = self.config.writer_memory_mb, "Created index writer");
        Ok(writer)
    }

    /// Readers see a commit only after `reload()`.
    pub(crate) fn reader(&self) -> Result<IndexReader, SearchError> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?)
    }
}

fn check_schema(path: &Path, found: &Schema, expected: &Schema) -> Result<(), SearchError> {
    if found == expected {
        return Ok(());
    }

    let mut differing: Vec<&str> = expected
        .fields()
        .filter(|(_, entry)| match found.get_field(entry.name()) {
            Ok(field) => found.get_field_entry(field) != *entry,
            Err(_) => true,
        })
        .map(|(_, entry)| entry.name())
        .collect();
    differing.extend(
        found
            .fields()
            .map(|(_, entry)| entry.name())
            .filter(|name| expected.get_field(name).is_err()),
    );

    Err(SearchError::SchemaMismatch(format!(
        "index at {} has incompatible fields: {}",
        path.display(),
        differing.join(", ")
    )))
}
