//! SQLite storage for the catalog and the postings table
//!
//! Schema: `indexes` → `fields` (weighted, scoped to an index) → `postings`,
//! with `terms` shared globally. Names carry a CRC-32 hash used as a lookup
//! shortcut; uniqueness and equality are always checked on the literal name.
//! Uses r2d2 connection pooling to allow concurrent reads without mutex blocking.

use crate::interface::{FieldEntry, IndexStats, SearchHit};
use crate::query::QueryCriteria;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

/// Weight given to fields created implicitly by a save
pub const DEFAULT_FIELD_WEIGHT: i64 = 1;

/// Largest weight `Engine::define_field` accepts
pub const MAX_FIELD_WEIGHT: i64 = i32::MAX as i64;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// 32-bit lookup hash of a stored name
pub(crate) fn name_hash(name: &str) -> i64 {
    i64::from(crc32fast::hash(name.as_bytes()))
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Thread-safe database wrapper using connection pooling
///
/// WAL mode lets readers proceed while a save holds the write lock.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA busy_timeout=5000;
                    PRAGMA cache_size=-32000;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                Ok(())
            });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS indexes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                name_hash INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fields (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                index_id INTEGER NOT NULL REFERENCES indexes(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                name_hash INTEGER NOT NULL,
                weight INTEGER NOT NULL DEFAULT 1,
                UNIQUE (index_id, name)
            );

            CREATE TABLE IF NOT EXISTS terms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                term TEXT NOT NULL UNIQUE,
                term_hash INTEGER NOT NULL,
                sensitive INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS postings (
                field_id INTEGER NOT NULL REFERENCES fields(id) ON DELETE CASCADE,
                term_id INTEGER NOT NULL REFERENCES terms(id),
                document_id INTEGER NOT NULL,
                occurrences INTEGER NOT NULL,
                PRIMARY KEY (field_id, term_id, document_id)
            );

            CREATE INDEX IF NOT EXISTS idx_indexes_hash ON indexes(name_hash);
            CREATE INDEX IF NOT EXISTS idx_fields_hash ON fields(index_id, name_hash);
            CREATE INDEX IF NOT EXISTS idx_terms_hash ON terms(term_hash);
            CREATE INDEX IF NOT EXISTS idx_postings_document ON postings(document_id, field_id);
        "#)?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    fn find_index(conn: &Connection, name: &str) -> DatabaseResult<Option<i64>> {
        Ok(conn
            .prepare_cached("SELECT id FROM indexes WHERE name_hash = ?1 AND name = ?2")?
            .query_row(params![name_hash(name), name], |row| row.get(0))
            .optional()?)
    }

    fn find_field(conn: &Connection, index_id: i64, name: &str) -> DatabaseResult<Option<i64>> {
        Ok(conn
            .prepare_cached("SELECT id FROM fields WHERE index_id = ?1 AND name_hash = ?2 AND name = ?3")?
            .query_row(params![index_id, name_hash(name), name], |row| row.get(0))
            .optional()?)
    }

    fn find_term(conn: &Connection, term: &str) -> DatabaseResult<Option<i64>> {
        Ok(conn
            .prepare_cached("SELECT id FROM terms WHERE term_hash = ?1 AND term = ?2")?
            .query_row(params![name_hash(term), term], |row| row.get(0))
            .optional()?)
    }

    // Each get-or-create inserts with ON CONFLICT DO NOTHING and re-reads, so a
    // concurrent creator on another pooled connection yields the same id.
    // Multi-row writers take an IMMEDIATE transaction. Under WAL a deferred one
    // that has already read cannot upgrade once another writer commits.

    fn get_or_create_index(conn: &Connection, name: &str) -> DatabaseResult<i64> {
        if let Some(id) = Self::find_index(conn, name)? {
            return Ok(id);
        }
        conn.prepare_cached("INSERT INTO indexes (name, name_hash) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING")?
            .execute(params![name, name_hash(name)])?;
        Self::find_index(conn, name)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn get_or_create_field(conn: &Connection, index_id: i64, name: &str, weight: i64) -> DatabaseResult<i64> {
        if let Some(id) = Self::find_field(conn, index_id, name)? {
            return Ok(id);
        }
        conn.prepare_cached(
            "INSERT INTO fields (index_id, name, name_hash, weight) VALUES (?1, ?2, ?3, ?4) ON CONFLICT(index_id, name) DO NOTHING",
        )?
        .execute(params![index_id, name, name_hash(name), weight])?;
        Self::find_field(conn, index_id, name)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn get_or_create_term(conn: &Connection, term: &str) -> DatabaseResult<i64> {
        if let Some(id) = Self::find_term(conn, term)? {
            return Ok(id);
        }
        conn.prepare_cached("INSERT INTO terms (term, term_hash) VALUES (?1, ?2) ON CONFLICT(term) DO NOTHING")?
            .execute(params![term, name_hash(term)])?;
        Self::find_term(conn, term)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Look up an index id by name
    pub fn index_id(&self, name: &str) -> DatabaseResult<Option<i64>> {
        let conn = self.get_conn()?;
        Self::find_index(&conn, name)
    }

    /// Look up a field id within an index
    pub fn field_id(&self, index_id: i64, name: &str) -> DatabaseResult<Option<i64>> {
        let conn = self.get_conn()?;
        Self::find_field(&conn, index_id, name)
    }

    /// Look up a term id
    pub fn term_id(&self, term: &str) -> DatabaseResult<Option<i64>> {
        let conn = self.get_conn()?;
        Self::find_term(&conn, term)
    }

    #[cfg(test)]
    fn ensure_index(&self, name: &str) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        Self::get_or_create_index(&conn, name)
    }

    /// Get or create a field. `weight` only applies when the field is new.
    pub fn ensure_field(&self, index: &str, name: &str, weight: i64) -> DatabaseResult<FieldEntry> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let index_id = Self::get_or_create_index(&tx, index)?;
        let field_id = Self::get_or_create_field(&tx, index_id, name, weight)?;
        let entry = tx.query_row(
            "SELECT id, index_id, name, weight FROM fields WHERE id = ?1",
            [field_id],
            Self::row_to_field,
        )?;
        tx.commit()?;
        Ok(entry)
    }

    #[cfg(test)]
    fn ensure_term(&self, term: &str) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        Self::get_or_create_term(&conn, term)
    }

    /// Set a term's sensitivity flag, creating the term if needed
    pub fn set_term_sensitivity(&self, term: &str, sensitive: bool) -> DatabaseResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let term_id = Self::get_or_create_term(&tx, term)?;
        tx.execute(
            "UPDATE terms SET sensitive = ?1 WHERE id = ?2",
            params![i64::from(sensitive), term_id],
        )?;
        tx.commit()?;
        Ok(term_id)
    }

    /// All fields of an index, in creation order
    pub fn fields_for_index(&self, index_id: i64) -> DatabaseResult<Vec<FieldEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, index_id, name, weight FROM fields WHERE index_id = ?1 ORDER BY id")?;
        let fields = stmt
            .query_map([index_id], Self::row_to_field)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fields)
    }

    fn row_to_field(row: &rusqlite::Row) -> rusqlite::Result<FieldEntry> {
        Ok(FieldEntry {
            id: row.get(0)?,
            index_id: row.get(1)?,
            name: row.get(2)?,
            weight: row.get(3)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Postings
    // ─────────────────────────────────────────────────────────────────────────────

    /// Replace the postings of one (index, field, document) in a single
    /// transaction: resolve or create the catalog rows, then delete and
    /// re-insert each term's posting. Returns the number of rows inserted.
    pub fn replace_postings(
        &self,
        index: &str,
        field: &str,
        document_id: i64,
        terms: &[(&str, u32)],
    ) -> DatabaseResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let index_id = Self::get_or_create_index(&tx, index)?;
        let field_id = Self::get_or_create_field(&tx, index_id, field, DEFAULT_FIELD_WEIGHT)?;

        let mut written = 0;
        for &(term, occurrences) in terms {
            let term_id = Self::get_or_create_term(&tx, term)?;
            tx.prepare_cached("DELETE FROM postings WHERE field_id = ?1 AND term_id = ?2 AND document_id = ?3")?
                .execute(params![field_id, term_id, document_id])?;
            written += tx
                .prepare_cached(
                    "INSERT INTO postings (field_id, term_id, document_id, occurrences) VALUES (?1, ?2, ?3, ?4)",
                )?
                .execute(params![field_id, term_id, document_id, occurrences])?;
        }

        tx.commit()?;
        Ok(written)
    }

    /// Delete every posting of a document in one field. Returns rows removed.
    pub fn delete_document_postings(&self, field_id: i64, document_id: i64) -> DatabaseResult<usize> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM postings WHERE field_id = ?1 AND document_id = ?2",
            params![field_id, document_id],
        )?;
        Ok(removed)
    }

    /// Stored occurrence count of one posting
    #[cfg(test)]
    fn occurrences(&self, field_id: i64, term_id: i64, document_id: i64) -> DatabaseResult<Option<i64>> {
        let conn = self.get_conn()?;
        Ok(conn
            .query_row(
                "SELECT occurrences FROM postings WHERE field_id = ?1 AND term_id = ?2 AND document_id = ?3",
                params![field_id, term_id, document_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ranked page of documents. Ties on relevance fall back to ascending
    /// document id so consecutive pages neither overlap nor skip.
    pub fn ranked_documents(
        &self,
        index_id: i64,
        criteria: &QueryCriteria,
        offset: usize,
        limit: usize,
    ) -> DatabaseResult<Vec<SearchHit>> {
        let conn = self.get_conn()?;
        let (grouped, mut params) = criteria.grouped_select(index_id);
        let sql = format!("{} ORDER BY relevance DESC, p.document_id ASC LIMIT ? OFFSET ?", grouped);
        params.push(to_sql_int(limit).into());
        params.push(to_sql_int(offset).into());

        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok(SearchHit {
                    document_id: row.get(0)?,
                    relevance: Self::relevance(row)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// SQLite turns an overflowing integer product into REAL; saturate it back
    fn relevance(row: &rusqlite::Row) -> rusqlite::Result<i64> {
        match row.get_ref(1)? {
            ValueRef::Real(r) => Ok(r as i64),
            _ => row.get(1),
        }
    }

    /// Number of documents surviving the criteria
    pub fn count_documents(&self, index_id: i64, criteria: &QueryCriteria) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let (grouped, params) = criteria.grouped_select(index_id);
        let sql = format!("SELECT COUNT(*) FROM ({})", grouped);
        let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(params), |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn index_stats(&self, index_id: i64) -> DatabaseResult<IndexStats> {
        let conn = self.get_conn()?;
        let stats = conn.query_row(
            r#"SELECT (SELECT COUNT(*) FROM fields WHERE index_id = ?1),
                      COUNT(DISTINCT p.term_id),
                      COUNT(DISTINCT p.document_id),
                      COUNT(*)
               FROM postings p
               JOIN fields f ON f.id = p.field_id
               WHERE f.index_id = ?1"#,
            [index_id],
            |row| {
                Ok(IndexStats {
                    fields: row.get::<_, i64>(0)? as u64,
                    terms: row.get::<_, i64>(1)? as u64,
                    documents: row.get::<_, i64>(2)? as u64,
                    postings: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db.setup_schema().unwrap();
    }

    #[test]
    fn test_get_or_create_returns_same_id() {
        let db = Database::open_in_memory().unwrap();
        let a = db.ensure_index("blog").unwrap();
        let b = db.ensure_index("blog").unwrap();
        assert_eq!(a, b);
        assert_eq!(db.index_id("blog").unwrap(), Some(a));
        assert_eq!(db.index_id("news").unwrap(), None);

        let t1 = db.ensure_term("hello").unwrap();
        let t2 = db.ensure_term("hello").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(db.term_id("hello").unwrap(), Some(t1));
    }

    #[test]
    fn test_field_scoped_to_index() {
        let db = Database::open_in_memory().unwrap();
        let blog_title = db.ensure_field("blog", "title", 1).unwrap();
        let news_title = db.ensure_field("news", "title", 1).unwrap();
        assert_ne!(blog_title.id, news_title.id);
        assert_ne!(blog_title.index_id, news_title.index_id);

        let fields = db.fields_for_index(blog_title.index_id).unwrap();
        assert_eq!(fields, vec![blog_title]);
    }

    #[test]
    fn test_field_weight_fixed_at_creation() {
        let db = Database::open_in_memory().unwrap();
        let created = db.ensure_field("blog", "title", 5).unwrap();
        assert_eq!(created.weight, 5);

        let again = db.ensure_field("blog", "title", 9).unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.weight, 5);
    }

    #[test]
    fn test_lookup_verifies_literal_name() {
        let db = Database::open_in_memory().unwrap();
        let id = db.ensure_term("hello").unwrap();

        // Forge a row sharing the hash of "hello" under a different name
        let conn = db.get_conn().unwrap();
        conn.execute(
            "INSERT INTO terms (term, term_hash) VALUES ('impostor', ?1)",
            [name_hash("hello")],
        )
        .unwrap();
        drop(conn);

        assert_eq!(db.term_id("hello").unwrap(), Some(id));
        assert_eq!(db.term_id("impostor").unwrap(), None);
    }

    #[test]
    fn test_replace_postings_overwrites_count() {
        let db = Database::open_in_memory().unwrap();
        db.replace_postings("blog", "body", 1, &[("cat", 3)]).unwrap();
        db.replace_postings("blog", "body", 1, &[("cat", 1)]).unwrap();

        let index_id = db.index_id("blog").unwrap().unwrap();
        let field_id = db.field_id(index_id, "body").unwrap().unwrap();
        let term_id = db.term_id("cat").unwrap().unwrap();
        assert_eq!(db.occurrences(field_id, term_id, 1).unwrap(), Some(1));
    }

    #[test]
    fn test_delete_document_postings_counts_rows() {
        let db = Database::open_in_memory().unwrap();
        let written = db.replace_postings("blog", "body", 1, &[("cat", 1), ("dog", 2)]).unwrap();
        assert_eq!(written, 2);
        db.replace_postings("blog", "body", 2, &[("cat", 1)]).unwrap();

        let index_id = db.index_id("blog").unwrap().unwrap();
        let field_id = db.field_id(index_id, "body").unwrap().unwrap();
        assert_eq!(db.delete_document_postings(field_id, 1).unwrap(), 2);
        assert_eq!(db.delete_document_postings(field_id, 1).unwrap(), 0);
        assert_eq!(db.index_stats(index_id).unwrap().documents, 1);
    }

    #[test]
    fn test_set_term_sensitivity_creates_term() {
        let db = Database::open_in_memory().unwrap();
        let id = db.set_term_sensitivity("spoiler", true).unwrap();
        assert_eq!(db.term_id("spoiler").unwrap(), Some(id));

        let conn = db.get_conn().unwrap();
        let flag: i64 = conn
            .query_row("SELECT sensitive FROM terms WHERE id = ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(flag, 1);
    }

    #[test]
    fn test_index_stats() {
        let db = Database::open_in_memory().unwrap();
        db.replace_postings("blog", "title", 1, &[("hello", 1), ("world", 1)]).unwrap();
        db.replace_postings("blog", "body", 1, &[("hello", 2)]).unwrap();
        db.replace_postings("blog", "body", 2, &[("there", 1)]).unwrap();
        db.replace_postings("news", "body", 3, &[("other", 1)]).unwrap();

        let index_id = db.index_id("blog").unwrap().unwrap();
        let stats = db.index_stats(index_id).unwrap();
        assert_eq!(
            stats,
            IndexStats { fields: 2, terms: 3, documents: 2, postings: 4 }
        );
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index.db");
        {
            let db = Database::open(&path, 2).unwrap();
            db.replace_postings("blog", "body", 1, &[("cat", 1)]).unwrap();
        }
        let db = Database::open(&path, 2).unwrap();
        assert!(db.index_id("blog").unwrap().is_some());
        assert!(db.database_size().unwrap() > 0);
    }
}
