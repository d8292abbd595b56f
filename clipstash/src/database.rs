//! SQLite database layer for clipboard records
//!
//! Single `clipboard` table, one row per record.
//! Uses r2d2 connection pooling; WAL mode keeps readers off the writer's back.

use once_cell::sync::Lazy;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::filter::FilterExpr;
use crate::models::{parse_item_type, StoredRecord};

/// Current schema version, kept in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

const COLUMNS: [&str; 8] = [
    "id",
    "item_type",
    "content",
    "copy_date",
    "is_favorite",
    "match_value",
    "search_value",
    "meta_data",
];

static SELECT_RECORDS: Lazy<String> =
    Lazy::new(|| format!("SELECT {} FROM clipboard", COLUMNS.join(", ")));

/// Error messages SQLite uses when a statement names a column the table lacks
const DRIFT_SIGNATURES: [&str; 2] = ["no such column", "has no column named"];

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Storage location is not a directory: {0}")]
    InvalidLocation(PathBuf),
}

impl DatabaseError {
    /// True when the on-disk table no longer has a column the store expects
    pub fn is_schema_drift(&self) -> bool {
        match self {
            DatabaseError::Sqlite(e) => {
                let message = e.to_string();
                DRIFT_SIGNATURES.iter().any(|sig| message.contains(sig))
            }
            _ => false,
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Connection settings
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Database wrapper using connection pooling
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database file with connection pooling
    pub fn open<P: AsRef<Path>>(path: P, settings: &ConnectionSettings) -> DatabaseResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(DatabaseError::InvalidLocation(parent.to_path_buf()));
            }
        }

        let busy_timeout = settings.busy_timeout;
        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            // journal_mode answers with a row, so it cannot go through execute_batch
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "cache_size", -8000)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(settings.pool_size.max(1))
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // In-memory needs single connection to maintain state
        let pool = Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Create the table if missing and bring older files up to date
    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS clipboard (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_type TEXT NOT NULL DEFAULT 'TEXT',
                content TEXT NOT NULL DEFAULT '',
                copy_date TEXT NOT NULL DEFAULT '',
                is_favorite INTEGER NOT NULL DEFAULT 0,
                match_value TEXT NOT NULL DEFAULT '',
                search_value TEXT NOT NULL DEFAULT '',
                meta_data TEXT NOT NULL DEFAULT ''
            );
            "#,
        )?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            Self::migrate(&conn)?;
        }

        Ok(())
    }

    /// Ensure optional columns exist (may be missing in files written before
    /// search keys and metadata were stored). Required columns are not
    /// patched here; a file missing those is rebuilt by the store.
    fn migrate(conn: &rusqlite::Connection) -> DatabaseResult<()> {
        for col in ["search_value", "meta_data"] {
            let has_column = conn
                .prepare(&format!("SELECT {col} FROM clipboard LIMIT 0"))
                .is_ok();
            if !has_column {
                debug!(column = col, "adding missing column");
                conn.execute_batch(&format!(
                    "ALTER TABLE clipboard ADD COLUMN {col} TEXT NOT NULL DEFAULT ''"
                ))?;
            }
        }

        conn.execute_batch(&format!(
            "
            CREATE INDEX IF NOT EXISTS idx_clipboard_copy_date ON clipboard(copy_date);
            PRAGMA user_version = {SCHEMA_VERSION};
            "
        ))?;
        Ok(())
    }

    /// Insert a new record, returns the row ID
    pub fn insert_record(&self, record: &StoredRecord) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO clipboard (item_type, content, copy_date, is_favorite, match_value, search_value, meta_data)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                record.item_type.as_str(),
                record.content,
                record.copy_date,
                record.is_favorite,
                record.match_value,
                record.search_value,
                record.meta_data,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Replace every non-id column. Returns the number of rows touched.
    pub fn update_record(&self, id: i64, record: &StoredRecord) -> DatabaseResult<usize> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"UPDATE clipboard
               SET item_type = ?1, content = ?2, copy_date = ?3, is_favorite = ?4,
                   match_value = ?5, search_value = ?6, meta_data = ?7
               WHERE id = ?8"#,
            params![
                record.item_type.as_str(),
                record.content,
                record.copy_date,
                record.is_favorite,
                record.match_value,
                record.search_value,
                record.meta_data,
                id,
            ],
        )?;
        Ok(changed)
    }

    /// Find a record by ID
    pub fn find_by_id(&self, id: i64) -> DatabaseResult<Option<StoredRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE id = ?1", SELECT_RECORDS.as_str());
        let record = conn
            .query_row(&sql, [id], Self::row_to_stored_record)
            .optional()?;
        Ok(record)
    }

    /// Delete a record by ID. Returns the number of rows removed.
    pub fn delete_record(&self, id: i64) -> DatabaseResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM clipboard WHERE id = ?1", [id])?)
    }

    /// Fetch every record in insertion order
    pub fn fetch_all(&self) -> DatabaseResult<Vec<StoredRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY id ASC", SELECT_RECORDS.as_str());
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], Self::row_to_stored_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Fetch records matching `filter`, most recent first, sliced by
    /// `limit`/`offset`. `None` filter matches everything.
    pub fn fetch_filtered(
        &self,
        filter: Option<&FilterExpr>,
        limit: Option<usize>,
        offset: usize,
    ) -> DatabaseResult<Vec<StoredRecord>> {
        let mut bound = Vec::new();
        let where_clause = match filter {
            Some(expr) => format!(" WHERE {}", expr.to_sql(&mut bound)),
            None => String::new(),
        };

        // SQLite only accepts OFFSET after a LIMIT; -1 is unbounded
        let limit = limit.map(to_sql_int).unwrap_or(-1);
        bound.push(rusqlite::types::Value::Integer(limit));
        let limit_idx = bound.len();
        bound.push(rusqlite::types::Value::Integer(to_sql_int(offset)));
        let offset_idx = bound.len();

        let sql = format!(
            "{}{} ORDER BY copy_date DESC, id DESC LIMIT ?{} OFFSET ?{}",
            SELECT_RECORDS.as_str(),
            where_clause,
            limit_idx,
            offset_idx
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(bound), Self::row_to_stored_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Get total number of records
    #[cfg(test)]
    pub fn count_records(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM clipboard", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Run raw SQL against the pool (schema manipulation in tests)
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        self.get_conn()?.execute_batch(sql)?;
        Ok(())
    }

    /// Convert a database row to a StoredRecord
    fn row_to_stored_record(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
        let id: i64 = row.get(0)?;
        let item_type: String = row.get(1)?;
        let content: String = row.get(2)?;
        let copy_date: String = row.get(3)?;
        let is_favorite: bool = row.get(4)?;
        let match_value: String = row.get(5)?;
        let search_value: Option<String> = row.get(6)?;
        let meta_data: Option<String> = row.get(7)?;

        Ok(StoredRecord {
            id: Some(id),
            item_type: parse_item_type(&item_type),
            content,
            copy_date,
            is_favorite,
            match_value,
            search_value: search_value.unwrap_or_default(),
            meta_data: meta_data.unwrap_or_default(),
        })
    }
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
