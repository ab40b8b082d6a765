// crates/quickfile-store/src/schema.rs
// ============================================================================
// Module: Schema Manager
// Description: Connection setup, table creation, and schema version checks.
// Purpose: Keep the on-disk layout in lockstep with this build.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`ensure_schema`] is idempotent and runs on every open. [`verify_schema`]
//! refuses to continue against a store written by a different layout version.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::config::SqliteStoreConfig;
use crate::error::FileStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Tables and indexes for file metadata, tags, and chunks.
const CREATE_TABLES_SQL: &str = "CREATE TABLE IF NOT EXISTS meta (
        fid INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        account TEXT NOT NULL,
        mime TEXT NOT NULL,
        created INTEGER NOT NULL,
        expire INTEGER,
        bucket TEXT,
        length INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS tags (
        tid INTEGER PRIMARY KEY,
        fid INTEGER NOT NULL,
        tag TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS chunks (
        cid INTEGER PRIMARY KEY,
        fid INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        length INTEGER NOT NULL,
        data BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_meta_expire_bucket_account
        ON meta (expire, bucket, account);
    CREATE INDEX IF NOT EXISTS idx_tags_fid ON tags (fid);
    CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags (tag);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_fid_seq ON chunks (fid, seq);";

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Ensures the parent directory for the store exists.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), FileStoreError> {
    let Some(parent) = path.parent() else {
        return Err(FileStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| FileStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
pub(crate) fn validate_store_path(path: &Path) -> Result<(), FileStoreError> {
    if path.as_os_str().is_empty() {
        return Err(FileStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(FileStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(FileStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(FileStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
pub(crate) fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, FileStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies busy-timeout, journal, and sync settings.
///
/// The busy timeout goes first so the journal pragma waits out a busy writer.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), FileStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates the store tables and records the schema version when missing.
///
/// Safe to call on every start; existing tables and versions are untouched.
///
/// # Errors
///
/// Returns [`FileStoreError::Db`] when a statement fails.
pub fn ensure_schema(connection: &mut Connection) -> Result<(), FileStoreError> {
    let tx = connection.transaction().map_err(|err| FileStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    if version.is_none() {
        tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        tracing::debug!(version = SCHEMA_VERSION, "recorded store schema version");
    }
    tx.execute_batch(CREATE_TABLES_SQL).map_err(|err| FileStoreError::Db(err.to_string()))?;
    tx.commit().map_err(|err| FileStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Confirms the stored schema version matches [`SCHEMA_VERSION`].
///
/// # Errors
///
/// Returns [`FileStoreError::VersionMismatch`] when the version differs or
/// was never recorded, and [`FileStoreError::Db`] when the query fails.
pub fn verify_schema(connection: &Connection) -> Result<(), FileStoreError> {
    let version: Option<i64> = connection
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    match version {
        Some(value) if value == SCHEMA_VERSION => Ok(()),
        Some(value) => Err(FileStoreError::VersionMismatch(format!(
            "unsupported schema version: {value} (expected {SCHEMA_VERSION})"
        ))),
        None => Err(FileStoreError::VersionMismatch("schema version missing".to_string())),
    }
}
