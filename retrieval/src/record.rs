//! Member message records and the immutable store that holds them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clean::Cleaner;

/// Surrogate key of a record: its position in the cleaned corpus.
///
/// Ordering by id is ordering by corpus position, which is what ties are
/// broken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(usize);

impl RecordId {
    /// Position of the record in its store.
    pub fn position(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message as supplied by the upstream source, before cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Who wrote the message (member name).
    pub identity: String,

    /// When the message was written.
    pub timestamp: DateTime<FixedOffset>,

    /// Message body as received.
    pub text: String,

    /// Upstream message id, if the source provides one.
    pub source_id: Option<String>,
}

impl RawRecord {
    /// Create a raw record without an upstream id.
    pub fn new(
        identity: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            timestamp,
            text: text.into(),
            source_id: None,
        }
    }

    /// Attach the upstream message id.
    pub fn with_source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }
}

/// A cleaned, indexed message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: RecordId,
    pub identity: String,
    pub timestamp: DateTime<FixedOffset>,

    /// Cleaned message text, never empty.
    pub text: String,

    pub source_id: Option<String>,
}

/// The cleaned corpus, in source order.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Arc<Record>>,
    dropped: usize,
}

impl RecordStore {
    /// Clean raw records and keep those with non-empty text.
    ///
    /// Ids are assigned consecutively over the kept records, so source order
    /// is preserved in id order.
    pub fn build(raw: impl IntoIterator<Item = RawRecord>, cleaner: Cleaner) -> Self {
        let mut records = Vec::new();
        let mut dropped = 0;

        for raw in raw {
            let text = cleaner(&raw.text);
            if text.is_empty() {
                debug!("Dropping message from {} with empty text", raw.identity);
                dropped += 1;
                continue;
            }

            let id = RecordId(records.len());
            records.push(Arc::new(Record {
                id,
                identity: cleaner(&raw.identity),
                timestamp: raw.timestamp,
                text,
                source_id: raw.source_id,
            }));
        }

        Self { records, dropped }
    }

    /// Look up a record by id.
    pub fn get(&self, id: RecordId) -> Option<&Arc<Record>> {
        self.records.get(id.position()).filter(|r| r.id == id)
    }

    /// Records in corpus order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.iter()
    }

    /// Cleaned texts in corpus order, ready for batch embedding.
    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of raw records excluded because their text cleaned to nothing.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
