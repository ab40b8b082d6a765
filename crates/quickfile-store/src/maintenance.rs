// crates/quickfile-store/src/maintenance.rs
// ============================================================================
// Module: Maintenance
// Description: Expiry cleanup, conditional vacuum, and a periodic worker.
// Purpose: Reclaim rows and disk space from expired files.
// Dependencies: rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! [`Maintenance`] owns the lock shared by cleanup and vacuum so the two never
//! interleave; vacuum's slack calculation always sees a settled post-cleanup
//! state. Cleanup deletes expired metadata first (the visibility cut) and then
//! the chunk and tag rows it orphaned. [`MaintenanceWorker`] runs a full cycle
//! on a background thread at a fixed interval.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::Sender;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::params;
use serde::Serialize;

use crate::error::FileStoreError;
use crate::model::CleanupStats;
use crate::model::VacuumStats;
use crate::model::unix_millis;
use crate::stats::query_statistics;
use crate::store::SqliteFileStore;

// ============================================================================
// SECTION: Maintenance
// ============================================================================

/// Result of one cleanup + vacuum cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Rows removed by cleanup.
    pub cleanup: CleanupStats,
    /// Vacuum outcome.
    pub vacuum: VacuumStats,
}

/// Owner of the cleanup/vacuum lock.
///
/// # Invariants
/// - Cleanup and vacuum only run while `lock` is held.
pub struct Maintenance {
    /// Store being maintained.
    store: SqliteFileStore,
    /// Serializes cleanup and vacuum.
    lock: Mutex<()>,
}

impl Maintenance {
    /// Creates the maintenance component for `store`.
    #[must_use]
    pub const fn new(store: SqliteFileStore) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Acquires the maintenance lock.
    fn acquire(&self) -> Result<MutexGuard<'_, ()>, FileStoreError> {
        self.lock.lock().map_err(|_| FileStoreError::Db("maintenance mutex poisoned".to_string()))
    }

    /// Deletes expired files, then their orphaned chunks and tags.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Db`] when a delete fails; rows deleted by
    /// earlier steps stay deleted and the next run finishes the job.
    pub fn cleanup_expired(&self) -> Result<CleanupStats, FileStoreError> {
        let _held = self.acquire()?;
        self.cleanup_locked()
    }

    /// Compacts the store when slack exceeds `threshold` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Db`] when a size query or the compaction fails.
    pub fn try_vacuum(&self, threshold: i64) -> Result<VacuumStats, FileStoreError> {
        let _held = self.acquire()?;
        self.vacuum_locked(threshold)
    }

    /// Runs cleanup then vacuum under a single hold of the lock.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub fn run_cycle(&self, vacuum_threshold: i64) -> Result<MaintenanceReport, FileStoreError> {
        let _held = self.acquire()?;
        let cleanup = self.cleanup_locked()?;
        let vacuum = self.vacuum_locked(vacuum_threshold)?;
        Ok(MaintenanceReport {
            cleanup,
            vacuum,
        })
    }

    /// Cleanup body; caller holds the maintenance lock.
    fn cleanup_locked(&self) -> Result<CleanupStats, FileStoreError> {
        let guard = self.store.lock_writer()?;
        let deleted_files = delete_rows(
            &guard,
            "DELETE FROM meta WHERE expire IS NOT NULL AND expire <= ?1",
            Some(unix_millis()),
        )?;
        let deleted_chunks = delete_rows(
            &guard,
            "DELETE FROM chunks WHERE fid NOT IN (SELECT fid FROM meta)",
            None,
        )?;
        let deleted_tags =
            delete_rows(&guard, "DELETE FROM tags WHERE fid NOT IN (SELECT fid FROM meta)", None)?;
        drop(guard);
        let stats = CleanupStats {
            deleted_files,
            deleted_chunks,
            deleted_tags,
        };
        if !stats.is_empty() {
            tracing::info!(
                deleted_files,
                deleted_chunks,
                deleted_tags,
                "cleaned up expired files"
            );
        }
        Ok(stats)
    }

    /// Vacuum body; caller holds the maintenance lock.
    fn vacuum_locked(&self, threshold: i64) -> Result<VacuumStats, FileStoreError> {
        if threshold <= 0 {
            return Ok(VacuumStats::default());
        }
        let guard = self.store.lock_writer()?;
        let old_size = store_size(&guard)?;
        let live = query_statistics(&guard, None, unix_millis())?;
        let slack = old_size - live.total_size;
        if slack <= threshold {
            tracing::debug!(old_size, slack, threshold, "vacuum skipped");
            return Ok(VacuumStats {
                vacuumed: false,
                old_size,
                new_size: old_size,
            });
        }
        guard.execute_batch("VACUUM;").map_err(|err| FileStoreError::Db(err.to_string()))?;
        guard
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", params![], |_| Ok(()))
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        let new_size = store_size(&guard)?;
        drop(guard);
        tracing::info!(old_size, new_size, slack, "vacuumed file store");
        Ok(VacuumStats {
            vacuumed: true,
            old_size,
            new_size,
        })
    }
}

/// Executes a delete and returns the affected row count.
fn delete_rows(
    connection: &Connection,
    sql: &str,
    now: Option<i64>,
) -> Result<i64, FileStoreError> {
    let deleted = match now {
        Some(now) => connection.execute(sql, params![now]),
        None => connection.execute(sql, params![]),
    }
    .map_err(|err| FileStoreError::Db(err.to_string()))?;
    i64::try_from(deleted).map_err(|_| FileStoreError::Db("deleted row count overflow".to_string()))
}

/// Raw database size in bytes (`page_count * page_size`).
fn store_size(connection: &Connection) -> Result<i64, FileStoreError> {
    let page_count: i64 = connection
        .query_row("PRAGMA page_count", params![], |row| row.get(0))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    let page_size: i64 = connection
        .query_row("PRAGMA page_size", params![], |row| row.get(0))
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    Ok(page_count.saturating_mul(page_size))
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Background thread running [`Maintenance::run_cycle`] on an interval.
pub struct MaintenanceWorker {
    /// Signals the worker loop to stop.
    shutdown: Sender<()>,
    /// Worker thread handle.
    handle: JoinHandle<()>,
}

impl MaintenanceWorker {
    /// Spawns the worker. The first cycle runs after one `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Io`] when the thread cannot be spawned.
    pub fn spawn(
        maintenance: Arc<Maintenance>,
        interval: Duration,
        vacuum_threshold: i64,
    ) -> Result<Self, FileStoreError> {
        let (shutdown, receiver) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("quickfile-maintenance".to_string())
            .spawn(move || loop {
                match receiver.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = maintenance.run_cycle(vacuum_threshold) {
                            tracing::warn!(
                                error = %err,
                                "maintenance cycle failed; retrying next interval"
                            );
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|err| FileStoreError::Io(err.to_string()))?;
        Ok(Self {
            shutdown,
            handle,
        })
    }

    /// Stops the worker and waits for any in-flight cycle to finish.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Io`] when the worker thread panicked.
    pub fn shutdown(self) -> Result<(), FileStoreError> {
        let _ = self.shutdown.send(());
        self.handle
            .join()
            .map_err(|_| FileStoreError::Io("maintenance worker panicked".to_string()))
    }
}
