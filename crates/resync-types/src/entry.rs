//! Index entry model.
//!
//! An [`IndexEntry`] is the slice of a search-index document that the
//! reconciliation loop reads and writes: identity, status marker, and the
//! last-modified timestamp used for staleness. An [`IndexDocument`] adds the
//! searchable content re-derived from the system of record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResyncError;
use crate::record::ItemRecord;

/// Status marker carried by an index entry.
///
/// `Provisional` entries were written before their originating transaction
/// was known to have committed. `Confirmed` is the normal state; an entry
/// with no status marker at all is `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Written optimistically, backing row not yet verified
    Provisional,
    /// Known to match a committed, still-existing record
    #[default]
    Confirmed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Provisional => "provisional",
            EntryStatus::Confirmed => "confirmed",
        }
    }

    /// Parse from string, returning None for unknown markers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisional" => Some(EntryStatus::Provisional),
            "confirmed" => Some(EntryStatus::Confirmed),
            _ => None,
        }
    }

    /// Resolve a status marker as read from the index.
    ///
    /// Only the provisional marker selects `Provisional`. A missing, empty or
    /// unrecognised marker reads as `Confirmed`, matching how status queries
    /// partition the index.
    pub fn from_marker(marker: Option<&str>) -> Self {
        match marker {
            Some(m) if m == EntryStatus::Provisional.as_str() => EntryStatus::Provisional,
            _ => EntryStatus::Confirmed,
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = ResyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ResyncError::InvalidInput(format!("unknown status: {}", s)))
    }
}

/// Projection of one search-index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Identity of the represented entity (system-of-record primary key)
    pub id: String,

    /// Status marker
    #[serde(default)]
    pub status: EntryStatus,

    /// Time of the last write to this entry
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, status: EntryStatus, last_modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status,
            last_modified,
        }
    }

    /// A provisional entry written now.
    pub fn provisional(id: impl Into<String>) -> Self {
        Self::new(id, EntryStatus::Provisional, Utc::now())
    }

    /// A confirmed entry written now.
    pub fn confirmed(id: impl Into<String>) -> Self {
        Self::new(id, EntryStatus::Confirmed, Utc::now())
    }

    pub fn is_provisional(&self) -> bool {
        self.status == EntryStatus::Provisional
    }

    /// Elapsed time since the last write, as seen at `now`.
    ///
    /// Negative when `last_modified` lies in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_modified
    }

    /// Last-modified time in milliseconds since the Unix epoch
    pub fn last_modified_ms(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }
}

/// One page of a status-filtered index scan.
///
/// Documents that matched but could not be read are reported by id in
/// `unreadable` instead of failing the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPage {
    pub entries: Vec<IndexEntry>,
    pub unreadable: Vec<String>,
    /// Id of the last matched document, readable or not. Resume after it.
    pub last_id: Option<String>,
}

impl EntryPage {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        let last_id = entries.last().map(|e| e.id.clone());
        Self {
            entries,
            unreadable: Vec::new(),
            last_id,
        }
    }

    /// Documents matched by the query, readable or not.
    pub fn matched(&self) -> usize {
        self.entries.len() + self.unreadable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched() == 0
    }
}

/// A full index document: the entry plus its searchable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub entry: IndexEntry,
    pub title: String,
    /// Searchable text (title, authors, subjects, issue date)
    pub text: String,
    /// Owning collection, if the entity has one
    #[serde(default)]
    pub collection_id: Option<String>,
}

impl IndexDocument {
    /// Derive the index document for a system-of-record item.
    pub fn from_record(record: &ItemRecord, status: EntryStatus, now: DateTime<Utc>) -> Self {
        Self {
            entry: IndexEntry::new(record.id.clone(), status, now),
            title: record.title.clone(),
            text: record.searchable_text(),
            collection_id: Some(record.collection_id.clone()),
        }
    }

    /// A bare document carrying only the entry fields.
    pub fn bare(entry: IndexEntry) -> Self {
        Self {
            entry,
            title: String::new(),
            text: String::new(),
            collection_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }
}
