//! Record store
//!
//! `RecordStore` owns the pooled SQLite backend and exposes the caller-facing
//! operations. A backend error reporting a missing column triggers a one-time
//! rebuild of the database file; the operation is then retried once.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::database::{ConnectionSettings, Database, DatabaseError, DatabaseResult};
use crate::filter::{compile_predicate, compile_pushdown, FilterStrategy};
use crate::interface::{ClipboardHistory, ClipboardRecord, SaveRequest, StoreError};
use crate::models::StoredRecord;
use crate::query::QueryDescriptor;

/// Backing file name inside the storage directory
pub const DEFAULT_FILE_NAME: &str = "pano.db";

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub file_name: String,
    pub strategy: FilterStrategy,
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        let connection = ConnectionSettings::default();
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            strategy: FilterStrategy::default(),
            pool_size: connection.pool_size,
            busy_timeout: connection.busy_timeout,
        }
    }
}

impl StoreOptions {
    pub fn with_strategy(mut self, strategy: FilterStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            pool_size: self.pool_size,
            busy_timeout: self.busy_timeout,
        }
    }
}

/// Lifecycle of a store instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Never opened, or shut down
    Closed,
    Operating,
    /// Rebuilding the database file after schema drift
    Recovering,
    /// Rebuild failed; no connection is held until the next `open`
    Failed,
}

/// SQLite-backed clipboard history
pub struct RecordStore {
    options: StoreOptions,
    db: Option<Database>,
    location: Option<PathBuf>,
    state: StoreState,
    /// Set on the first drift; never cleared for the lifetime of the instance
    recovered: bool,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl RecordStore {
    /// Create a closed store
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            db: None,
            location: None,
            state: StoreState::Closed,
            recovered: false,
        }
    }

    /// Create a store with default options and open it at `location`
    pub fn open_at(location: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut store = Self::default();
        store.open(location)?;
        Ok(store)
    }

    /// Open (or create) the database file inside `location`.
    /// Reopening an open store closes the previous connection first.
    #[instrument(skip(self, location), fields(location = %location.as_ref().display()))]
    pub fn open(&mut self, location: impl AsRef<Path>) -> Result<(), StoreError> {
        let location = location.as_ref();
        if !location.is_dir() {
            return Err(StoreError::Open(format!(
                "{} is not a directory",
                location.display()
            )));
        }

        self.db = None;
        self.state = StoreState::Closed;

        let path = location.join(&self.options.file_name);
        let db = match Database::open(&path, &self.options.connection_settings()) {
            Ok(db) => db,
            Err(e) if e.is_schema_drift() && !self.recovered => {
                // Schema setup itself hit drift; take the one rebuild here
                self.recovered = true;
                warn!(error = %e, "schema drift while opening, rebuilding database");
                self.location = Some(location.to_path_buf());
                self.rebuild()?;
                info!(path = %path.display(), strategy = ?self.options.strategy, "record store opened");
                return Ok(());
            }
            Err(e) => return Err(classify(e, StoreError::Open)),
        };

        info!(path = %path.display(), strategy = ?self.options.strategy, "record store opened");
        self.db = Some(db);
        self.location = Some(location.to_path_buf());
        self.state = StoreState::Operating;
        Ok(())
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == StoreState::Operating && self.db.is_some()
    }

    /// Directory passed to the last successful `open`
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Persist a new record and return it with its assigned id
    #[instrument(skip(self, request), fields(item_type = %request.item_type))]
    pub fn save(&mut self, request: SaveRequest) -> Result<ClipboardRecord, StoreError> {
        let stored = StoredRecord::from_request(&request)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        let id = self.run(|db| db.insert_record(&stored), StoreError::WriteFailed)?;
        debug!(id, "record saved");
        Ok(ClipboardRecord::from_request(id, request))
    }

    /// Overwrite every non-id field of an existing record
    #[instrument(skip(self, record), fields(id = record.id))]
    pub fn update(&mut self, record: &ClipboardRecord) -> Result<ClipboardRecord, StoreError> {
        let stored = StoredRecord::from_record(record)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        let changed = self.run(
            |db| db.update_record(record.id, &stored),
            StoreError::WriteFailed,
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(stored.into_record())
    }

    /// Remove a record. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let removed = self.run(|db| db.delete_record(id), StoreError::WriteFailed)?;
        if removed == 0 {
            debug!(id, "delete of unknown id ignored");
        }
        Ok(())
    }

    /// Look up a single record by id
    #[instrument(skip(self))]
    pub fn get(&mut self, id: i64) -> Result<Option<ClipboardRecord>, StoreError> {
        let found = self.run(|db| db.find_by_id(id), StoreError::ReadFailed)?;
        Ok(found.map(StoredRecord::into_record))
    }

    /// Run a query, most recent first. Errors are logged and yield no rows.
    #[instrument(skip(self, descriptor), fields(strategy = ?self.options.strategy, conditions = descriptor.conditions().len()))]
    pub fn query(&mut self, descriptor: &QueryDescriptor) -> Vec<ClipboardRecord> {
        match self.try_query(descriptor) {
            Ok(records) => {
                debug!(count = records.len(), "query complete");
                records
            }
            Err(e) => {
                warn!(error = %e, "query failed, returning no records");
                Vec::new()
            }
        }
    }

    fn try_query(&mut self, descriptor: &QueryDescriptor) -> Result<Vec<ClipboardRecord>, StoreError> {
        let limit = descriptor.limit();
        let offset = descriptor.offset();

        match self.options.strategy {
            FilterStrategy::Pushdown => {
                let filter = compile_pushdown(descriptor);
                let rows = self.run(
                    |db| db.fetch_filtered(filter.as_ref(), limit, offset),
                    StoreError::ReadFailed,
                )?;
                Ok(rows.into_iter().map(StoredRecord::into_record).collect())
            }
            FilterStrategy::InMemory => {
                let predicate = compile_predicate(descriptor);
                let rows = self.run(|db| db.fetch_all(), StoreError::ReadFailed)?;
                let records = rows.into_iter().map(StoredRecord::into_record).collect();
                Ok(predicate.apply(records, limit, offset))
            }
        }
    }

    /// Release the backend. Later operations fail until `open` is called.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) {
        if self.db.take().is_some() {
            debug!("record store shut down");
        }
        self.state = StoreState::Closed;
    }

    /// Execute `op` against the open backend. On the first schema drift of
    /// this instance the database is rebuilt and `op` re-issued once.
    fn run<T, F>(&mut self, op: F, on_error: fn(String) -> StoreError) -> Result<T, StoreError>
    where
        F: Fn(&Database) -> DatabaseResult<T>,
    {
        if self.state != StoreState::Operating {
            return Err(StoreError::NotInitialized);
        }
        let db = self.db.as_ref().ok_or(StoreError::NotInitialized)?;

        match op(db) {
            Ok(value) => Ok(value),
            Err(e) if e.is_schema_drift() => {
                if self.recovered {
                    warn!(error = %e, "schema drift after recovery, giving up");
                    return Err(StoreError::SchemaDrift(e.to_string()));
                }
                self.recovered = true;
                warn!(error = %e, "schema drift detected, rebuilding database");

                self.rebuild()?;
                let db = self.db.as_ref().ok_or(StoreError::NotInitialized)?;
                op(db).map_err(|e| classify(e, on_error))
            }
            Err(e) => Err(on_error(e.to_string())),
        }
    }

    /// Drop the pool, delete the database and its WAL sidecars, reopen
    fn rebuild(&mut self) -> Result<(), StoreError> {
        self.state = StoreState::Recovering;
        self.db = None;

        let Some(location) = self.location.clone() else {
            self.state = StoreState::Failed;
            return Err(StoreError::RecoveryFailed("store has no location".to_string()));
        };
        let path = location.join(&self.options.file_name);
        remove_database_files(&path);

        match Database::open(&path, &self.options.connection_settings()) {
            Ok(db) => {
                info!(path = %path.display(), "database rebuilt");
                self.db = Some(db);
                self.state = StoreState::Operating;
                Ok(())
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "database rebuild failed");
                self.state = StoreState::Failed;
                Err(StoreError::RecoveryFailed(e.to_string()))
            }
        }
    }
}

fn classify(e: DatabaseError, on_error: fn(String) -> StoreError) -> StoreError {
    if e.is_schema_drift() {
        StoreError::SchemaDrift(e.to_string())
    } else {
        on_error(e.to_string())
    }
}

/// Delete the database file and its WAL sidecars. Failures are only logged.
fn remove_database_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let file = with_suffix(path, suffix);
        match std::fs::remove_file(&file) {
            Ok(()) => debug!(file = %file.display(), "removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %file.display(), error = %e, "could not remove database file"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl ClipboardHistory for RecordStore {
    fn save(&mut self, request: SaveRequest) -> Result<ClipboardRecord, StoreError> {
        RecordStore::save(self, request)
    }

    fn update(&mut self, record: &ClipboardRecord) -> Result<ClipboardRecord, StoreError> {
        RecordStore::update(self, record)
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        RecordStore::delete(self, id)
    }

    fn query(&mut self, descriptor: &QueryDescriptor) -> Vec<ClipboardRecord> {
        RecordStore::query(self, descriptor)
    }

    fn shutdown(&mut self) {
        RecordStore::shutdown(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ClipboardQueryBuilder;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open_at(dir.path()).unwrap();
        (dir, store)
    }

    fn break_schema(store: &RecordStore) {
        store
            .db
            .as_ref()
            .unwrap()
            .execute_batch("ALTER TABLE clipboard RENAME COLUMN match_value TO legacy_key")
            .unwrap();
    }

    #[test]
    fn test_new_store_is_closed() {
        let mut store = RecordStore::default();
        assert_eq!(store.state(), StoreState::Closed);
        assert!(!store.is_open());
        assert!(store.location().is_none());
        assert_eq!(store.save(SaveRequest::text("x")), Err(StoreError::NotInitialized));
        assert!(store.query(&QueryDescriptor::all()).is_empty());
    }

    #[test]
    fn test_open_creates_file() {
        let (dir, store) = open_store();
        assert!(store.is_open());
        assert_eq!(store.location(), Some(dir.path()));
        assert!(dir.path().join(DEFAULT_FILE_NAME).exists());
    }

    #[test]
    fn test_open_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        let mut store = RecordStore::default();
        assert!(matches!(store.open(&file), Err(StoreError::Open(_))));
        assert!(matches!(
            store.open(dir.path().join("missing")),
            Err(StoreError::Open(_))
        ));
        assert_eq!(store.state(), StoreState::Closed);
    }

    #[test]
    fn test_custom_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::new(StoreOptions::default().with_file_name("history.db"));
        store.open(dir.path()).unwrap();
        assert!(dir.path().join("history.db").exists());
        assert!(!dir.path().join(DEFAULT_FILE_NAME).exists());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let (_dir, mut store) = open_store();
        let saved = store.save(SaveRequest::text("x")).unwrap();
        let mut ghost = saved.clone();
        ghost.id = saved.id + 1000;
        assert_eq!(store.update(&ghost), Err(StoreError::NotFound(ghost.id)));
    }

    #[test]
    fn test_delete_then_get() {
        let (_dir, mut store) = open_store();
        let saved = store.save(SaveRequest::text("gone soon")).unwrap();
        assert!(store.get(saved.id).unwrap().is_some());

        store.delete(saved.id).unwrap();
        assert!(store.get(saved.id).unwrap().is_none());
        store.delete(saved.id).unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (dir, mut store) = open_store();
        store.shutdown();
        store.shutdown();
        assert_eq!(store.state(), StoreState::Closed);
        assert_eq!(store.delete(1), Err(StoreError::NotInitialized));

        store.open(dir.path()).unwrap();
        assert!(store.is_open());
    }

    #[test]
    fn test_drift_rebuilds_once_then_fails() {
        let (dir, mut store) = open_store();
        store.save(SaveRequest::text("lost in rebuild")).unwrap();

        break_schema(&store);
        let saved = store.save(SaveRequest::text("after rebuild")).unwrap();
        assert_eq!(store.state(), StoreState::Operating);

        let all = store.query(&QueryDescriptor::all());
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, saved.id);
        assert_eq!(all[0].content, "after rebuild");

        // Latched: the second drift surfaces and nothing is rebuilt
        break_schema(&store);
        let err = store.save(SaveRequest::text("never stored")).unwrap_err();
        assert!(matches!(err, StoreError::SchemaDrift(_)), "{err:?}");
        assert_eq!(store.state(), StoreState::Operating);

        let conn = rusqlite::Connection::open(dir.path().join(DEFAULT_FILE_NAME)).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM clipboard", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    fn write_table_without_copy_date(dir: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(with_suffix(&dir.join(DEFAULT_FILE_NAME), suffix));
        }
        let conn = rusqlite::Connection::open(dir.join(DEFAULT_FILE_NAME)).unwrap();
        conn.execute_batch(
            "CREATE TABLE clipboard (id INTEGER PRIMARY KEY, item_type TEXT, content TEXT)",
        )
        .unwrap();
    }

    #[test]
    fn test_drift_during_open_uses_the_single_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        write_table_without_copy_date(dir.path());

        let mut store = RecordStore::default();
        store.open(dir.path()).unwrap();
        assert!(store.recovered);
        assert_eq!(store.state(), StoreState::Operating);
        assert!(store.save(SaveRequest::text("ok")).is_ok());

        store.shutdown();
        write_table_without_copy_date(dir.path());
        let err = store.open(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::SchemaDrift(_)), "{err:?}");
        assert!(!store.is_open());
    }

    #[test]
    fn test_latch_survives_reopen() {
        let (dir, mut store) = open_store();
        break_schema(&store);
        store.save(SaveRequest::text("first")).unwrap();

        store.shutdown();
        store.open(dir.path()).unwrap();
        break_schema(&store);
        assert!(matches!(
            store.save(SaveRequest::text("second")),
            Err(StoreError::SchemaDrift(_))
        ));
    }

    #[test]
    fn test_query_recovers_from_drift() {
        let (_dir, mut store) = open_store();
        store.save(SaveRequest::text("old")).unwrap();
        break_schema(&store);

        assert!(store.query(&QueryDescriptor::all()).is_empty());
        assert_eq!(store.state(), StoreState::Operating);
        assert!(store.save(SaveRequest::text("new")).is_ok());
    }

    #[test]
    fn test_failed_rebuild_enters_failed_state() {
        let (dir, mut store) = open_store();
        break_schema(&store);
        store.location = Some(dir.path().join("vanished"));

        let err = store.save(SaveRequest::text("x")).unwrap_err();
        assert!(matches!(err, StoreError::RecoveryFailed(_)), "{err:?}");
        assert_eq!(store.state(), StoreState::Failed);
        assert!(!store.is_open());

        assert_eq!(store.save(SaveRequest::text("y")), Err(StoreError::NotInitialized));
        assert!(store.query(&QueryDescriptor::all()).is_empty());

        store.open(dir.path()).unwrap();
        assert_eq!(store.state(), StoreState::Operating);
    }

    #[test]
    fn test_other_errors_do_not_trigger_recovery() {
        let (_dir, mut store) = open_store();
        store
            .db
            .as_ref()
            .unwrap()
            .execute_batch("DROP TABLE clipboard")
            .unwrap();

        let err = store.save(SaveRequest::text("x")).unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)), "{err:?}");
        assert!(matches!(store.get(1), Err(StoreError::ReadFailed(_))));
        assert!(!store.recovered);
        assert_eq!(store.state(), StoreState::Operating);
    }

    #[test]
    fn test_in_memory_strategy_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::new(StoreOptions::default().with_strategy(FilterStrategy::InMemory));
        store.open(dir.path()).unwrap();
        for content in ["a", "b", "c"] {
            store.save(SaveRequest::text(content)).unwrap();
        }

        let page = store.query(&ClipboardQueryBuilder::new().with_limit(1, 1).build());
        assert_eq!(page.len(), 1);
    }
}
