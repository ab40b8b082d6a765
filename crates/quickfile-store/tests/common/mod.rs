// crates/quickfile-store/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared store builders, upload requests, and payload generators.
// Purpose: Keep integration tests focused on behavior instead of setup.
// Dependencies: quickfile-store, rand, tempfile
// ============================================================================

//! ## Overview
//! Fixtures for the store integration tests. Payloads come from a seeded
//! [`StdRng`] so failures reproduce.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use quickfile_store::AccountLimits;
use quickfile_store::FileId;
use quickfile_store::FileInsertMeta;
use quickfile_store::SqliteFileStore;
use quickfile_store::SqliteStoreConfig;
use quickfile_store::UploadPolicy;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Store Builders
// ============================================================================

/// Accounts every default test policy admits.
pub const ACCOUNTS: [&str; 2] = ["alice", "bob"];

/// Database path inside a temp dir.
pub fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("quickfile.db")
}

/// Default policy for [`ACCOUNTS`], allowing immediate expiry.
pub fn test_policy() -> UploadPolicy {
    ACCOUNTS.iter().fold(UploadPolicy::default(), |policy, account| {
        policy.with_account(*account, permissive_limits())
    })
}

/// Default account limits with a zero minimum expiry.
pub fn permissive_limits() -> AccountLimits {
    AccountLimits {
        min_expire: Duration::ZERO,
        ..AccountLimits::default()
    }
}

/// Opens a store in `dir` with [`test_policy`].
pub fn store_for(dir: &TempDir) -> SqliteFileStore {
    store_with_policy(dir, test_policy())
}

/// Opens a store in `dir` with the given policy.
pub fn store_with_policy(dir: &TempDir, policy: UploadPolicy) -> SqliteFileStore {
    SqliteFileStore::new(SqliteStoreConfig::for_path(db_path(dir)), policy).expect("open store")
}

/// Raw connection for inspecting rows behind the store's back.
pub fn raw_connection(dir: &TempDir) -> Connection {
    Connection::open(db_path(dir)).expect("open raw connection")
}

/// Counts rows in `table` belonging to `id`.
pub fn rows_for(connection: &Connection, table: &str, id: FileId) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE fid = ?1");
    connection.query_row(&sql, params![id.get()], |row| row.get(0)).expect("count rows")
}

/// Counts every row in `table`.
pub fn total_rows(connection: &Connection, table: &str) -> i64 {
    connection
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), params![], |row| row.get(0))
        .expect("count rows")
}

// ============================================================================
// SECTION: Requests and Payloads
// ============================================================================

/// Upload request living for one hour with no tags or bucket.
pub fn meta(account: &str, filename: &str) -> FileInsertMeta {
    FileInsertMeta {
        filename: filename.to_string(),
        account: account.to_string(),
        tags: Vec::new(),
        expire: Duration::from_secs(60 * 60),
        bucket: None,
    }
}

/// Upload request that is already expired once stored.
pub fn expired_meta(account: &str, filename: &str) -> FileInsertMeta {
    FileInsertMeta {
        expire: Duration::ZERO,
        ..meta(account, filename)
    }
}

/// Deterministic pseudo-random payload.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut bytes = vec![0_u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    bytes
}

/// Reads a stored file back in full.
pub fn read_all(store: &SqliteFileStore, id: FileId) -> Vec<u8> {
    let mut reader = store.open_reader(id).expect("open reader");
    let mut out = Vec::new();
    reader.read_to_end(&mut out).expect("read file");
    reader.close().expect("close reader");
    out
}
