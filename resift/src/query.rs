//! Query criteria and SQL construction
//!
//! `QueryCriteria` is a plain value: build it, pass it to `Engine::query` or
//! `Engine::count` as often as needed. Criteria are translated into one
//! grouped SELECT whose predicates are evaluated per posting row:
//!
//! ```text
//! postings ⋈ fields ⋈ terms  WHERE index ∧ (fields) ∧ (terms) ∧ (ids)
//!   GROUP BY document  HAVING max(sensitive over the whole document) = flag
//! ```
//!
//! Relevance is `SUM(occurrences) * SUM(weight)` over the surviving rows of a
//! document. Both factors grow with the number of matching rows, so documents
//! hitting several (field, term) pairs score super-linearly.

use crate::config::EngineConfig;
use crate::database::name_hash;
use crate::interface::{ContentFilter, MatchMode};
use crate::normalize::normalize;
use rusqlite::types::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCriteria {
    fields: BTreeSet<String>,
    terms: BTreeSet<String>,
    documents: BTreeSet<i64>,
    field_mode: MatchMode,
    term_mode: MatchMode,
    content_filter: ContentFilter,
}

impl Default for QueryCriteria {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl QueryCriteria {
    /// Empty criteria carrying the configured default modes
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            fields: BTreeSet::new(),
            terms: BTreeSet::new(),
            documents: BTreeSet::new(),
            field_mode: config.field_mode,
            term_mode: config.term_mode,
            content_filter: config.content_filter,
        }
    }

    /// Restrict to a field name (normalized)
    pub fn field(mut self, name: &str) -> Self {
        self.fields.insert(normalize(name));
        self
    }

    /// Restrict to a term (normalized)
    pub fn term(mut self, term: &str) -> Self {
        self.terms.insert(normalize(term));
        self
    }

    /// Restrict to an explicit document id
    pub fn document(mut self, document_id: i64) -> Self {
        self.documents.insert(document_id);
        self
    }

    pub fn field_mode(mut self, mode: MatchMode) -> Self {
        self.field_mode = mode;
        self
    }

    pub fn term_mode(mut self, mode: MatchMode) -> Self {
        self.term_mode = mode;
        self
    }

    pub fn content_filter(mut self, filter: ContentFilter) -> Self {
        self.content_filter = filter;
        self
    }

    #[cfg(test)]
    fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    #[cfg(test)]
    fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    /// Grouped SELECT yielding `(document_id, relevance)` rows, unordered.
    pub(crate) fn grouped_select(&self, index_id: i64) -> (String, Vec<Value>) {
        let mut params: Vec<Value> = vec![index_id.into()];
        let mut conditions = vec!["f.index_id = ?".to_string()];

        if let Some(clause) = name_clause("f.name_hash", "f.name", &self.fields, self.field_mode, &mut params) {
            conditions.push(clause);
        }
        if let Some(clause) = name_clause("t.term_hash", "t.term", &self.terms, self.term_mode, &mut params) {
            conditions.push(clause);
        }
        if !self.documents.is_empty() {
            let placeholders = self.documents.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            conditions.push(format!("p.document_id IN ({})", placeholders));
            params.extend(self.documents.iter().map(|&id| Value::from(id)));
        }

        let having = match self.content_filter.required_flag() {
            Some(flag) => {
                params.push(index_id.into());
                params.push(flag.into());
                r#"HAVING (SELECT MAX(ts.sensitive)
                           FROM postings ps
                           JOIN terms ts ON ts.id = ps.term_id
                           JOIN fields fs ON fs.id = ps.field_id
                           WHERE ps.document_id = p.document_id AND fs.index_id = ?) = ?"#
            }
            None => "",
        };

        let sql = format!(
            r#"SELECT p.document_id, SUM(p.occurrences) * SUM(f.weight) AS relevance
               FROM postings p
               JOIN terms t ON t.id = p.term_id
               JOIN fields f ON f.id = p.field_id
               WHERE {}
               GROUP BY p.document_id
               {}"#,
            conditions.join(" AND "),
            having
        );

        (sql, params)
    }
}

/// `((hash = ? AND name = ?) <joiner> ...)`, or None without criteria.
/// The hash narrows the lookup, the literal comparison rules out collisions.
fn name_clause(
    hash_column: &str,
    name_column: &str,
    names: &BTreeSet<String>,
    mode: MatchMode,
    params: &mut Vec<Value>,
) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let predicates: Vec<String> = names
        .iter()
        .map(|name| {
            params.push(name_hash(name).into());
            params.push(name.clone().into());
            format!("({} = ? AND {} = ?)", hash_column, name_column)
        })
        .collect();
    Some(format!("({})", predicates.join(mode.sql_joiner())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config() {
        let config = EngineConfig {
            field_mode: MatchMode::Any,
            term_mode: MatchMode::All,
            content_filter: ContentFilter::Off,
            ..EngineConfig::default()
        };
        let criteria = QueryCriteria::from_config(&config);
        assert_eq!(criteria.field_mode, MatchMode::Any);
        assert_eq!(criteria.term_mode, MatchMode::All);
        assert_eq!(criteria.content_filter, ContentFilter::Off);
    }

    #[test]
    fn test_criteria_are_normalized_and_deduplicated() {
        let criteria = QueryCriteria::default()
            .term("Hello!")
            .term("hello")
            .field(" Title ");
        assert_eq!(criteria.terms().collect::<Vec<_>>(), vec!["hello"]);
        assert_eq!(criteria.fields().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn test_unrestricted_select_has_only_index_param() {
        let (sql, params) = QueryCriteria::default().grouped_select(7);
        assert_eq!(params, vec![Value::Integer(7)]);
        assert!(!sql.contains("HAVING"));
        assert!(!sql.contains("IN ("));
    }

    #[test]
    fn test_all_mode_joins_with_and() {
        let (sql, params) = QueryCriteria::default()
            .term_mode(MatchMode::All)
            .term("red")
            .term("blue")
            .grouped_select(1);
        assert!(sql.contains("(t.term_hash = ? AND t.term = ?) AND (t.term_hash = ? AND t.term = ?)"));
        // index + two (hash, name) pairs
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_any_mode_joins_with_or() {
        let (sql, _) = QueryCriteria::default()
            .term_mode(MatchMode::Any)
            .term("red")
            .term("blue")
            .grouped_select(1);
        assert!(sql.contains("(t.term_hash = ? AND t.term = ?) OR (t.term_hash = ? AND t.term = ?)"));
    }

    #[test]
    fn test_content_filter_adds_having_params() {
        let (sql, params) = QueryCriteria::default()
            .document(3)
            .document(4)
            .content_filter(ContentFilter::On)
            .grouped_select(9);
        assert!(sql.contains("HAVING"));
        assert!(sql.contains("p.document_id IN (?,?)"));
        assert_eq!(
            params,
            vec![
                Value::Integer(9),
                Value::Integer(3),
                Value::Integer(4),
                Value::Integer(9),
                Value::Integer(1),
            ]
        );
    }
}
