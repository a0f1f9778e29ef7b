//! Resift Public Interface
//!
//! Shared types handed across the library boundary: match modes, the
//! content filter switch, result records and the error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// How several field or term criteria combine.
///
/// Both modes apply per posting row, not per document: `All` joins the
/// criterion predicates with AND, so two distinct names can never hold for
/// the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    All,
    Any,
}

impl MatchMode {
    pub(crate) fn sql_joiner(self) -> &'static str {
        match self {
            MatchMode::All => " AND ",
            MatchMode::Any => " OR ",
        }
    }
}

/// Gate on a document's highest term sensitivity flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentFilter {
    /// Only documents with at least one sensitive term
    On,
    /// Only documents without any sensitive term
    Off,
    Unrestricted,
}

impl ContentFilter {
    /// Flag value the per-document maximum must equal, if any
    pub(crate) fn required_flag(self) -> Option<i64> {
        match self {
            ContentFilter::On => Some(1),
            ContentFilter::Off => Some(0),
            ContentFilter::Unrestricted => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// One ranked document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub document_id: i64,
    pub relevance: i64,
}

/// A page of hits plus the unpaginated match count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub total_count: u64,
}

/// Outcome of draining a buffer into storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    /// Posting rows inserted
    pub postings_written: usize,
    /// (index, field, document) groups that committed
    pub committed_groups: usize,
    /// Groups that failed and were skipped
    pub failed_groups: usize,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed_groups == 0
    }
}

/// Catalog entry for a field within an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldEntry {
    pub id: i64,
    pub index_id: i64,
    pub name: String,
    pub weight: i64,
}

/// Size of one index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub fields: u64,
    pub terms: u64,
    pub documents: u64,
    pub postings: u64,
}

/// Error type for resift operations
#[derive(Debug, Error)]
pub enum ResiftError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Statement failed: {0}")]
    Statement(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type ResiftResult<T> = Result<T, ResiftError>;

impl From<crate::database::DatabaseError> for ResiftError {
    fn from(e: crate::database::DatabaseError) -> Self {
        match e {
            crate::database::DatabaseError::Pool(_) | crate::database::DatabaseError::Io(_) => {
                ResiftError::StorageUnavailable(e.to_string())
            }
            crate::database::DatabaseError::Sqlite(_) => ResiftError::Statement(e.to_string()),
        }
    }
}
