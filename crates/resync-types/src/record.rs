//! System-of-record entities.
//!
//! Items belong to a collection. Deleting a collection deletes its items,
//! which is the usual way index entries end up orphaned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A collection owning items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// Unique identifier (ULID string)
    pub id: String,
    pub name: String,
}

impl CollectionRecord {
    /// Create a collection with a fresh ULID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            name: name.into(),
        }
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// An archived item as held by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Unique identifier (ULID string), also the index document id
    pub id: String,

    /// Owning collection
    pub collection_id: String,

    pub title: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub subjects: Vec<String>,

    /// Issue date as entered (e.g. "2010-10-17")
    #[serde(default)]
    pub issue_date: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl ItemRecord {
    /// Create an item with a fresh ULID in the given collection.
    pub fn new(collection_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::with_id(Ulid::new().to_string(), collection_id, title)
    }

    /// Create an item with an explicit id.
    pub fn with_id(
        id: impl Into<String>,
        collection_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            collection_id: collection_id.into(),
            title: title.into(),
            authors: Vec::new(),
            subjects: Vec::new(),
            issue_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.push(subject.into());
        self
    }

    pub fn with_issue_date(mut self, date: impl Into<String>) -> Self {
        self.issue_date = Some(date.into());
        self
    }

    /// Text indexed for full-text search.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.title.clone()];
        parts.extend(self.authors.iter().cloned());
        parts.extend(self.subjects.iter().cloned());
        if let Some(date) = &self.issue_date {
            parts.push(date.clone());
        }
        parts.join(" ")
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
