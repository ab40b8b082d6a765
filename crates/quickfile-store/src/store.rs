// crates/quickfile-store/src/store.rs
// ============================================================================
// Module: SQLite File Store
// Description: Connection ownership plus metadata, listing, and expiry queries.
// Purpose: Entry point for every request-scope store operation.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`SqliteFileStore`] owns one writer connection guarded by a mutex and a
//! small pool of read connections. Inserts, expire-now, and maintenance go
//! through the writer; metadata lookups, listings, statistics, and the
//! standalone precheck use the read pool, which under WAL never blocks the
//! writer. Chunk readers open a dedicated connection each.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use rusqlite::params;
use rusqlite::params_from_iter;

use crate::config::SqliteStoreConfig;
use crate::config::UploadPolicy;
use crate::error::FileStoreError;
use crate::model::FileId;
use crate::model::FileInsertMeta;
use crate::model::FileRecord;
use crate::model::Statistics;
use crate::model::unix_millis;
use crate::precheck::PrecheckOutcome;
use crate::precheck::run_precheck;
use crate::schema::ensure_parent_dir;
use crate::schema::ensure_schema;
use crate::schema::open_connection;
use crate::schema::validate_store_path;
use crate::schema::verify_schema;
use crate::stats::query_statistics;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed chunked blob store.
///
/// # Invariants
/// - All mutations are serialized through `write_connection`.
/// - The schema version was verified when the store was opened.
#[derive(Clone)]
pub struct SqliteFileStore {
    /// Store configuration.
    pub(crate) config: SqliteStoreConfig,
    /// Upload acceptance rules.
    pub(crate) policy: Arc<UploadPolicy>,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read connection pool.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteFileStore {
    /// Opens (creating if needed) a file store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::VersionMismatch`] when the on-disk layout
    /// belongs to another version, or a storage error when the database
    /// cannot be opened or initialized.
    pub fn new(config: SqliteStoreConfig, policy: UploadPolicy) -> Result<Self, FileStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        config.validate()?;
        let mut write_connection = open_connection(&config)?;
        ensure_schema(&mut write_connection)?;
        verify_schema(&write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        tracing::info!(
            path = %config.path.display(),
            read_pool_size = config.read_pool_size,
            accounts = policy.accounts.len(),
            "opened file store"
        );
        Ok(Self {
            config,
            policy: Arc::new(policy),
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Locks the writer connection.
    pub(crate) fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, FileStoreError> {
        self.write_connection
            .lock()
            .map_err(|_| FileStoreError::Db("write mutex poisoned".to_string()))
    }

    /// Locks the next read connection using round-robin selection.
    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>, FileStoreError> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        self.read_connections[index]
            .lock()
            .map_err(|_| FileStoreError::Db("read mutex poisoned".to_string()))
    }

    /// Validates an upload request without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Invalid`] or [`FileStoreError::QuotaExceeded`]
    /// for the first failing check, or a storage error.
    pub fn precheck(&self, meta: &FileInsertMeta) -> Result<PrecheckOutcome, FileStoreError> {
        let guard = self.lock_reader()?;
        run_precheck(&guard, &self.policy, meta, unix_millis())
    }

    /// Returns live file count and byte total, optionally for one account.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Db`] when the query fails.
    pub fn statistics(&self, account: Option<&str>) -> Result<Statistics, FileStoreError> {
        let guard = self.lock_reader()?;
        query_statistics(&guard, account, unix_millis())
    }

    /// Looks up one file, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::NotFound`] when no record has this id.
    pub fn get_by_id(&self, id: FileId) -> Result<FileRecord, FileStoreError> {
        let guard = self.lock_reader()?;
        fetch_record(&guard, id)
    }

    /// Looks up many files at once; unknown ids are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Db`] when a query fails.
    pub fn get_by_ids(
        &self,
        ids: &[FileId],
    ) -> Result<BTreeMap<FileId, FileRecord>, FileStoreError> {
        let guard = self.lock_reader()?;
        fetch_records(&guard, ids)
    }

    /// Lists live file ids, newest first.
    ///
    /// `bucket` selects one unlisted bucket; `None` lists files without a
    /// bucket. `account` restricts to one owner when set.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Invalid`] for a zero page size or an offset
    /// past `i64::MAX`, and [`FileStoreError::Db`] when the query fails.
    pub fn list_page(
        &self,
        page: u32,
        page_size: u32,
        bucket: Option<&str>,
        account: Option<&str>,
    ) -> Result<Vec<FileId>, FileStoreError> {
        if page_size == 0 {
            return Err(FileStoreError::Invalid("page_size must be greater than zero".to_string()));
        }
        let offset = i64::from(page).checked_mul(i64::from(page_size)).ok_or_else(|| {
            FileStoreError::Invalid(format!(
                "page offset overflows: page {page} of size {page_size}"
            ))
        })?;
        let guard = self.lock_reader()?;
        let mut stmt = guard
            .prepare_cached(
                "SELECT fid FROM meta WHERE (expire IS NULL OR expire > ?1) AND bucket IS ?2 \
                 AND (?3 IS NULL OR account = ?3) ORDER BY fid DESC LIMIT ?4 OFFSET ?5",
            )
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(
                params![unix_millis(), bucket, account, i64::from(page_size), offset],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(FileId::new(row.map_err(|err| FileStoreError::Db(err.to_string()))?));
        }
        Ok(ids)
    }

    /// Soft-deletes a file by moving its expiry back to its creation time.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::NotFound`] when no record has this id.
    pub fn expire_now(&self, id: FileId) -> Result<(), FileStoreError> {
        let guard = self.lock_writer()?;
        let updated = guard
            .execute("UPDATE meta SET expire = created WHERE fid = ?1", params![id.get()])
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        drop(guard);
        if updated == 0 {
            return Err(FileStoreError::NotFound(id.to_string()));
        }
        tracing::info!(file_id = %id, "expired file");
        Ok(())
    }
}

// ============================================================================
// SECTION: Record Queries
// ============================================================================

/// Fetches one record with its tags.
pub(crate) fn fetch_record(
    connection: &Connection,
    id: FileId,
) -> Result<FileRecord, FileStoreError> {
    fetch_records(connection, &[id])?
        .remove(&id)
        .ok_or_else(|| FileStoreError::NotFound(id.to_string()))
}

/// Fetches records and tags for the given ids.
fn fetch_records(
    connection: &Connection,
    ids: &[FileId],
) -> Result<BTreeMap<FileId, FileRecord>, FileStoreError> {
    let mut records = BTreeMap::new();
    if ids.is_empty() {
        return Ok(records);
    }
    let placeholders =
        (1 ..= ids.len()).map(|index| format!("?{index}")).collect::<Vec<_>>().join(",");
    let raw_ids = ids.iter().map(|id| id.get()).collect::<Vec<_>>();

    let mut stmt = connection
        .prepare(&format!(
            "SELECT fid, name, account, mime, created, expire, bucket, length FROM meta \
             WHERE fid IN ({placeholders})"
        ))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(raw_ids.iter()), |row| {
            Ok(FileRecord {
                id: FileId::new(row.get(0)?),
                name: row.get(1)?,
                account: row.get(2)?,
                mime: row.get(3)?,
                created_at: row.get(4)?,
                expire_at: row.get(5)?,
                bucket: row.get(6)?,
                length: row.get(7)?,
                tags: BTreeSet::new(),
            })
        })
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    for row in rows {
        let record = row.map_err(|err| FileStoreError::Db(err.to_string()))?;
        records.insert(record.id, record);
    }
    drop(stmt);

    let mut stmt = connection
        .prepare(&format!("SELECT fid, tag FROM tags WHERE fid IN ({placeholders})"))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(raw_ids.iter()), |row| {
            Ok((FileId::new(row.get(0)?), row.get::<_, String>(1)?))
        })
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    for row in rows {
        let (id, tag) = row.map_err(|err| FileStoreError::Db(err.to_string()))?;
        if let Some(record) = records.get_mut(&id) {
            record.tags.insert(tag);
        }
    }
    Ok(records)
}
