//! Engine configuration
//!
//! Every field has a default, so a partial JSON file only overrides what it names.

use crate::interface::{ContentFilter, MatchMode, ResiftError, ResiftResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tokens must be longer than this many chars to be indexed
pub const DEFAULT_MIN_TERM_LEN: usize = 2;

/// Page size used when a caller does not pick one
pub const DEFAULT_LIMIT: usize = 1000;

const DEFAULT_POOL_SIZE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_term_len: usize,
    /// Mode a fresh `QueryCriteria` starts with for field criteria
    pub field_mode: MatchMode,
    /// Mode a fresh `QueryCriteria` starts with for term criteria
    pub term_mode: MatchMode,
    pub content_filter: ContentFilter,
    pub default_limit: usize,
    /// Connection pool size for file databases (in-memory always uses one)
    pub pool_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_term_len: DEFAULT_MIN_TERM_LEN,
            field_mode: MatchMode::All,
            term_mode: MatchMode::Any,
            content_filter: ContentFilter::Unrestricted,
            default_limit: DEFAULT_LIMIT,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> ResiftResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ResiftError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ResiftResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ResiftError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> ResiftResult<()> {
        if self.pool_size == 0 {
            return Err(ResiftError::Config("pool_size must be at least 1".into()));
        }
        if self.default_limit == 0 {
            return Err(ResiftError::Config("default_limit must be at least 1".into()));
        }
        Ok(())
    }
}
