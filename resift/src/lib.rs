//! Resift - relevance-ranked inverted index over SQLite
//!
//! Text attached to externally numbered documents is normalized, tokenized and
//! counted per (index, field, document, term), then persisted as postings.
//! Queries combine field, term and document-id criteria and rank documents by
//! `SUM(occurrences) * SUM(field weight)` over the matching posting rows.
//!
//! # Architecture
//! - `normalize`: text folding and tokenization
//! - `accumulator`: in-memory `PostingBuffer`, drained on save
//! - `database`: SQLite catalog (indexes, fields, terms) and postings
//! - `query`: `QueryCriteria` value object and its SQL translation
//! - `engine`: the `Engine` API tying it together

pub mod accumulator;
pub mod config;
pub mod database;
mod engine;
pub mod interface;
pub mod normalize;
pub mod query;

pub use accumulator::{PendingPosting, PostingBuffer};
pub use config::EngineConfig;
pub use engine::Engine;
pub use interface::*;
pub use query::QueryCriteria;
