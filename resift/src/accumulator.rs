//! In-memory posting buffer
//!
//! Text is recorded during a document-processing pass and counted per
//! (index, field, document, term). Nothing touches storage until the buffer
//! is handed to `Engine::save`, which drains it.

use crate::config::EngineConfig;
use crate::normalize::{normalize, tokenize};
use std::collections::BTreeMap;
use tracing::debug;

/// Buffer key: (index, field, document id, term)
type PostingKey = (String, String, i64, String);

/// One drained (index, field, document, term) count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPosting {
    pub index: String,
    pub field: String,
    pub document_id: i64,
    pub term: String,
    pub occurrences: u32,
}

impl PendingPosting {
    /// Entries sharing this key are written in one transaction
    pub(crate) fn group_key(&self) -> (&str, &str, i64) {
        (&self.index, &self.field, self.document_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostingBuffer {
    min_term_len: usize,
    counts: BTreeMap<PostingKey, u32>,
}

impl PostingBuffer {
    pub fn new(min_term_len: usize) -> Self {
        Self {
            min_term_len,
            counts: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.min_term_len)
    }

    /// Count every qualifying token of `text` for the given document field.
    /// The field name is normalized; the index name is kept as given. Text for
    /// a field whose name normalizes to nothing is dropped.
    pub fn record(&mut self, index: &str, field: &str, document_id: i64, text: &str) {
        let field = normalize(field);
        if field.is_empty() {
            debug!(target: "resift::accumulator", index, document_id, "Skipping text for unnamed field");
            return;
        }
        for token in tokenize(text, self.min_term_len) {
            *self
                .counts
                .entry((index.to_string(), field.clone(), document_id, token))
                .or_insert(0) += 1;
        }
    }

    /// Number of distinct buffered keys
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Take every buffered count, ordered by (index, field, document, term),
    /// leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<PendingPosting> {
        std::mem::take(&mut self.counts)
            .into_iter()
            .map(|((index, field, document_id, term), occurrences)| PendingPosting {
                index,
                field,
                document_id,
                term,
                occurrences,
            })
            .collect()
    }
}
