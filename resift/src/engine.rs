//! Engine - main API over the posting store
//!
//! Write path: record text into a `PostingBuffer`, then `save` it. Each
//! (index, field, document) group commits in its own transaction; a failing
//! group is logged and skipped, so a save can partially succeed.
//!
//! Read path: build a `QueryCriteria` and call `query` / `count`. Reads may
//! run concurrently with saves and can observe a document whose groups are
//! only partly written.

use crate::accumulator::{PendingPosting, PostingBuffer};
use crate::config::EngineConfig;
use crate::database::{Database, DatabaseError, MAX_FIELD_WEIGHT};
use crate::interface::{
    FieldEntry, IndexStats, ResiftError, ResiftResult, SaveReport, SearchHit, SearchResult,
};
use crate::normalize::normalize;
use crate::query::QueryCriteria;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Thread-safe search engine backed by SQLite
pub struct Engine {
    db: Arc<Database>,
    config: EngineConfig,
}

fn storage_unavailable(e: DatabaseError) -> ResiftError {
    ResiftError::StorageUnavailable(e.to_string())
}

impl Engine {
    /// Open or create an engine database at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> ResiftResult<Self> {
        let db = Database::open(path, config.pool_size).map_err(storage_unavailable)?;
        Ok(Self { db: Arc::new(db), config })
    }

    /// Engine over a private in-memory database
    pub fn open_in_memory(config: EngineConfig) -> ResiftResult<Self> {
        let db = Database::open_in_memory().map_err(storage_unavailable)?;
        Ok(Self { db: Arc::new(db), config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Empty buffer using the configured minimum term length
    pub fn buffer(&self) -> PostingBuffer {
        PostingBuffer::from_config(&self.config)
    }

    /// Empty criteria carrying the configured default modes
    pub fn criteria(&self) -> QueryCriteria {
        QueryCriteria::from_config(&self.config)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Drain `buffer` into storage. Every posting written replaces the stored
    /// count for its (field, term, document).
    pub fn save(&self, buffer: &mut PostingBuffer) -> SaveReport {
        let pending = buffer.drain();
        let mut report = SaveReport::default();

        for group in pending.chunk_by(|a, b| a.group_key() == b.group_key()) {
            match self.write_group(group) {
                Ok(written) => {
                    report.postings_written += written;
                    report.committed_groups += 1;
                }
                Err(e) => {
                    let (index, field, document_id) = group[0].group_key();
                    warn!(
                        target: "resift::engine",
                        index,
                        field,
                        document_id,
                        error = %e,
                        "Failed to save postings, group skipped"
                    );
                    report.failed_groups += 1;
                }
            }
        }

        debug!(
            target: "resift::engine",
            postings = report.postings_written,
            groups = report.committed_groups,
            failed = report.failed_groups,
            "Saved buffer"
        );
        report
    }

    fn write_group(&self, group: &[PendingPosting]) -> ResiftResult<usize> {
        let (index, field, document_id) = group[0].group_key();
        let terms: Vec<(&str, u32)> = group
            .iter()
            .map(|p| (p.term.as_str(), p.occurrences))
            .collect();
        Ok(self.db.replace_postings(index, field, document_id, &terms)?)
    }

    /// Remove every posting of `document_id` in `index`, across all of the
    /// index's fields. Returns the number of rows removed (0 for an unknown
    /// index). A field whose delete fails is logged and skipped.
    pub fn flush(&self, index: &str, document_id: i64) -> ResiftResult<usize> {
        let Some(index_id) = self.db.index_id(index)? else {
            return Ok(0);
        };

        let mut total = 0;
        for field in self.db.fields_for_index(index_id)? {
            match self.db.delete_document_postings(field.id, document_id) {
                Ok(removed) => total += removed,
                Err(e) => warn!(
                    target: "resift::engine",
                    index,
                    field = %field.name,
                    document_id,
                    error = %e,
                    "Failed to flush field postings"
                ),
            }
        }

        debug!(target: "resift::engine", index, document_id, removed = total, "Flushed document");
        Ok(total)
    }

    /// Create a field with the given weight. An existing field keeps the
    /// weight it was created with.
    pub fn define_field(&self, index: &str, field: &str, weight: i64) -> ResiftResult<FieldEntry> {
        if !(1..=MAX_FIELD_WEIGHT).contains(&weight) {
            return Err(ResiftError::InvalidInput(format!(
                "field weight must be between 1 and {}, got {}",
                MAX_FIELD_WEIGHT, weight
            )));
        }
        let field = normalize(field);
        if field.is_empty() {
            return Err(ResiftError::InvalidInput("field name is empty after normalization".into()));
        }
        Ok(self.db.ensure_field(index, &field, weight)?)
    }

    /// Assign the sensitivity flag read by the content filter
    pub fn mark_sensitive(&self, term: &str, sensitive: bool) -> ResiftResult<()> {
        let term = normalize(term);
        if term.is_empty() {
            return Err(ResiftError::InvalidInput("term is empty after normalization".into()));
        }
        self.db.set_term_sensitivity(&term, sensitive)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ranked documents of `index` matching `criteria`, sliced to
    /// `[offset, offset + limit)`.
    pub fn query(
        &self,
        index: &str,
        criteria: &QueryCriteria,
        offset: usize,
        limit: usize,
    ) -> ResiftResult<Vec<SearchHit>> {
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let Some(index_id) = self.resolve_index(index)? else {
            return Ok(Vec::new());
        };
        let hits = self
            .db
            .ranked_documents(index_id, criteria, offset, limit)
            .inspect_err(|e| warn!(target: "resift::query", index, error = %e, "Query failed"))?;

        #[cfg(feature = "perf-log")]
        debug!(
            target: "resift::query",
            index,
            hits = hits.len(),
            elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
            "Query finished"
        );

        Ok(hits)
    }

    /// Number of documents of `index` matching `criteria`
    pub fn count(&self, index: &str, criteria: &QueryCriteria) -> ResiftResult<u64> {
        let Some(index_id) = self.resolve_index(index)? else {
            return Ok(0);
        };
        Ok(self
            .db
            .count_documents(index_id, criteria)
            .inspect_err(|e| warn!(target: "resift::query", index, error = %e, "Count failed"))?)
    }

    /// First page at the configured default limit, plus the total count
    pub fn search(&self, index: &str, criteria: &QueryCriteria) -> ResiftResult<SearchResult> {
        let hits = self.query(index, criteria, 0, self.config.default_limit)?;
        let total_count = self.count(index, criteria)?;
        Ok(SearchResult { hits, total_count })
    }

    pub fn stats(&self, index: &str) -> ResiftResult<Option<IndexStats>> {
        match self.db.index_id(index)? {
            Some(index_id) => Ok(Some(self.db.index_stats(index_id)?)),
            None => Ok(None),
        }
    }

    pub fn fields(&self, index: &str) -> ResiftResult<Vec<FieldEntry>> {
        match self.db.index_id(index)? {
            Some(index_id) => Ok(self.db.fields_for_index(index_id)?),
            None => Ok(Vec::new()),
        }
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> ResiftResult<i64> {
        Ok(self.db.database_size()?)
    }

    fn resolve_index(&self, index: &str) -> ResiftResult<Option<i64>> {
        Ok(self
            .db
            .index_id(index)
            .inspect_err(|e| warn!(target: "resift::query", index, error = %e, "Index lookup failed"))?)
    }
}
