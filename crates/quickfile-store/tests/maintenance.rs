// crates/quickfile-store/tests/maintenance.rs
// ============================================================================
// Module: Maintenance Tests
// Description: Expiry cleanup, vacuum gating, and the background worker.
// Purpose: Confirm expired files are reclaimed and live files are untouched.
// ============================================================================

//! ## Overview
//! Tests for [`quickfile_store::Maintenance`] and
//! [`quickfile_store::MaintenanceWorker`].

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use quickfile_store::CHUNK_SIZE;
use quickfile_store::CleanupStats;
use quickfile_store::FileInsertMeta;
use quickfile_store::FileStoreError;
use quickfile_store::Maintenance;
use quickfile_store::MaintenanceWorker;
use quickfile_store::VacuumStats;
use tempfile::TempDir;

use crate::common::expired_meta;
use crate::common::meta;
use crate::common::payload;
use crate::common::raw_connection;
use crate::common::read_all;
use crate::common::rows_for;
use crate::common::store_for;
use crate::common::total_rows;

// ============================================================================
// SECTION: Cleanup
// ============================================================================

#[test]
fn cleanup_removes_expired_files_and_their_rows() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    let doomed_request = FileInsertMeta {
        tags: vec!["old".to_string(), "stale".to_string()],
        ..expired_meta("alice", "doomed.bin")
    };
    let doomed = store.insert(&doomed_request, payload(100 * CHUNK_SIZE, 1).as_slice()).unwrap();
    let keeper_request = FileInsertMeta {
        tags: vec!["keep".to_string()],
        ..meta("bob", "keeper.bin")
    };
    let keeper_bytes = payload(CHUNK_SIZE + 5, 2);
    let keeper = store.insert(&keeper_request, keeper_bytes.as_slice()).unwrap();

    let maintenance = Maintenance::new(store.clone());
    let stats = maintenance.cleanup_expired().unwrap();
    assert_eq!(stats, CleanupStats {
        deleted_files: 1,
        deleted_chunks: 100,
        deleted_tags: 2,
    });

    let conn = raw_connection(&dir);
    assert_eq!(rows_for(&conn, "chunks", doomed.id), 0);
    assert_eq!(rows_for(&conn, "tags", doomed.id), 0);
    assert!(matches!(store.get_by_id(doomed.id), Err(FileStoreError::NotFound(_))));
    assert!(matches!(store.open_reader(doomed.id), Err(FileStoreError::NotFound(_))));
    assert_eq!(read_all(&store, keeper.id), keeper_bytes);
    assert_eq!(store.get_by_id(keeper.id).unwrap().tags.len(), 1);
}

#[test]
fn cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    store.insert(&expired_meta("alice", "a.bin"), payload(10, 1).as_slice()).unwrap();
    let maintenance = Maintenance::new(store);
    assert!(!maintenance.cleanup_expired().unwrap().is_empty());
    assert!(maintenance.cleanup_expired().unwrap().is_empty());
}

#[test]
fn expire_now_then_cleanup_deletes_physically() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    let bytes = payload(3 * CHUNK_SIZE, 1);
    let record = store.insert(&meta("alice", "a.bin"), bytes.as_slice()).unwrap();
    let maintenance = Maintenance::new(store.clone());
    assert!(maintenance.cleanup_expired().unwrap().is_empty());

    store.expire_now(record.id).unwrap();
    let stats = maintenance.cleanup_expired().unwrap();
    assert_eq!((stats.deleted_files, stats.deleted_chunks), (1, 3));
    let conn = raw_connection(&dir);
    assert_eq!(total_rows(&conn, "meta"), 0);
    assert_eq!(total_rows(&conn, "chunks"), 0);
}

#[test]
fn cleanup_removes_orphans_left_by_external_deletes() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    let tagged = FileInsertMeta {
        tags: vec!["a".to_string()],
        ..meta("alice", "a.bin")
    };
    let record = store.insert(&tagged, payload(2 * CHUNK_SIZE, 1).as_slice()).unwrap();
    let conn = raw_connection(&dir);
    conn.execute("DELETE FROM meta WHERE fid = ?1", [record.id.get()]).unwrap();

    let stats = Maintenance::new(store).cleanup_expired().unwrap();
    assert_eq!(stats, CleanupStats {
        deleted_files: 0,
        deleted_chunks: 2,
        deleted_tags: 1,
    });
}

// ============================================================================
// SECTION: Vacuum
// ============================================================================

#[test]
fn vacuum_with_non_positive_threshold_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let maintenance = Maintenance::new(store_for(&dir));
    assert_eq!(maintenance.try_vacuum(0).unwrap(), VacuumStats::default());
    assert_eq!(maintenance.try_vacuum(-1).unwrap(), VacuumStats::default());
}

#[test]
fn vacuum_runs_only_when_slack_exceeds_threshold() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    let bytes = payload(40 * CHUNK_SIZE, 1);
    store.insert(&expired_meta("alice", "big.bin"), bytes.as_slice()).unwrap();
    let live = store.insert(&meta("bob", "small.bin"), payload(100, 2).as_slice()).unwrap();
    let maintenance = Maintenance::new(store.clone());
    maintenance.cleanup_expired().unwrap();

    let skipped = maintenance.try_vacuum(i64::MAX).unwrap();
    assert!(!skipped.vacuumed);
    assert_eq!(skipped.old_size, skipped.new_size);
    assert!(skipped.old_size > 40 * CHUNK_SIZE as i64);

    let compacted = maintenance.try_vacuum(CHUNK_SIZE as i64).unwrap();
    assert!(compacted.vacuumed);
    assert!(compacted.new_size < compacted.old_size);
    assert_eq!(read_all(&store, live.id).len(), 100);

    let again = maintenance.try_vacuum(CHUNK_SIZE as i64).unwrap();
    assert!(!again.vacuumed);
}

#[test]
fn run_cycle_reports_both_steps() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    let bytes = payload(20 * CHUNK_SIZE, 1);
    store.insert(&expired_meta("alice", "big.bin"), bytes.as_slice()).unwrap();
    let report = Maintenance::new(store).run_cycle(CHUNK_SIZE as i64).unwrap();
    assert_eq!(report.cleanup.deleted_files, 1);
    assert_eq!(report.cleanup.deleted_chunks, 20);
    assert!(report.vacuum.vacuumed);
}

// ============================================================================
// SECTION: Worker
// ============================================================================

#[test]
fn worker_reclaims_expired_files_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let store = store_for(&dir);
    let doomed = store.insert(&expired_meta("alice", "a.bin"), payload(10, 1).as_slice()).unwrap();
    let maintenance = Arc::new(Maintenance::new(store.clone()));
    let worker =
        MaintenanceWorker::spawn(Arc::clone(&maintenance), Duration::from_millis(20), 0).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while store.get_by_id(doomed.id).is_ok() {
        assert!(Instant::now() < deadline, "worker never cleaned up");
        thread::sleep(Duration::from_millis(10));
    }
    worker.shutdown().unwrap();
}
