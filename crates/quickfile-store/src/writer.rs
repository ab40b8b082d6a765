// crates/quickfile-store/src/writer.rs
// ============================================================================
// Module: Streaming Chunk Writer
// Description: Transactional upload path persisting a stream as chunk rows.
// Purpose: Store files of unknown length while enforcing quotas per block.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! An insert runs inside one `IMMEDIATE` transaction on the writer
//! connection: precheck, system usage, metadata row with a placeholder
//! length, tags, chunks, final length, commit. The input is consumed in
//! [`CHUNK_SIZE`] blocks so memory stays bounded by one block. Any error drops
//! the transaction, which rolls back every row written so far.
//!
//! Because the precheck and the system usage read happen inside the same
//! transaction that holds the writer lock, quotas are serialized against
//! concurrent inserts issued through this store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Read;

use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;

use crate::error::FileStoreError;
use crate::model::CHUNK_SIZE;
use crate::model::FileId;
use crate::model::FileInsertMeta;
use crate::model::FileRecord;
use crate::model::duration_millis;
use crate::model::unix_millis;
use crate::precheck::run_precheck;
use crate::stats::query_statistics;
use crate::store::SqliteFileStore;
use crate::store::fetch_record;

// ============================================================================
// SECTION: Quota Budget
// ============================================================================

/// Byte allowances checked after every block.
#[derive(Debug, Clone, Copy)]
struct ChunkBudget {
    /// Bytes the account may still store.
    account_remaining: i64,
    /// Bytes the whole system may still store.
    system_remaining: i64,
    /// Optional cap on this single upload.
    upload_limit: Option<i64>,
}

impl ChunkBudget {
    /// Fails once `total` bytes would exceed any allowance.
    fn check(&self, total: i64) -> Result<(), FileStoreError> {
        if total > self.account_remaining {
            return Err(FileStoreError::QuotaExceeded(format!(
                "out of account storage: {} bytes remaining",
                self.account_remaining.max(0)
            )));
        }
        if total > self.system_remaining {
            return Err(FileStoreError::QuotaExceeded(format!(
                "out of system storage: {} bytes remaining",
                self.system_remaining.max(0)
            )));
        }
        if let Some(limit) = self.upload_limit
            && total > limit
        {
            return Err(FileStoreError::QuotaExceeded(format!(
                "upload exceeds per-file size limit of {limit} bytes"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Insert
// ============================================================================

impl SqliteFileStore {
    /// Stores `data` as a new file and returns its committed record.
    ///
    /// # Errors
    ///
    /// Returns the first precheck failure, [`FileStoreError::QuotaExceeded`]
    /// when the stream outgrows any quota, [`FileStoreError::Io`] when the
    /// input fails, or [`FileStoreError::Db`]. No rows survive a failure.
    pub fn insert<R: Read>(
        &self,
        meta: &FileInsertMeta,
        mut data: R,
    ) -> Result<FileRecord, FileStoreError> {
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        let now = unix_millis();
        let outcome = run_precheck(&tx, &self.policy, meta, now)?;
        let system = query_statistics(&tx, None, now)?;
        let budget = ChunkBudget {
            account_remaining: outcome.remaining_bytes,
            system_remaining: self.policy.total_upload_limit - system.total_size,
            upload_limit: self.policy.max_upload_bytes,
        };

        let expire = now.saturating_add(duration_millis(meta.expire));
        tx.execute(
            "INSERT INTO meta (name, account, mime, created, expire, bucket, length) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![meta.filename, meta.account, outcome.mime, now, expire, meta.bucket],
        )
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
        let id = FileId::new(tx.last_insert_rowid());

        insert_tags(&tx, id, meta)?;
        let length = match insert_chunks(&tx, id, &mut data, budget) {
            Ok(length) => length,
            Err(err) => {
                if matches!(err, FileStoreError::QuotaExceeded(_)) {
                    tracing::warn!(
                        account = %meta.account,
                        filename = %meta.filename,
                        error = %err,
                        "upload rejected mid-stream"
                    );
                }
                return Err(err);
            }
        };

        tx.execute("UPDATE meta SET length = ?1 WHERE fid = ?2", params![length, id.get()])
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| FileStoreError::Db(err.to_string()))?;

        let record = fetch_record(&guard, id)?;
        drop(guard);
        tracing::info!(
            file_id = %id,
            account = %record.account,
            mime = %record.mime,
            length = record.length,
            "stored file"
        );
        Ok(record)
    }
}

/// Inserts the distinct tag set for `id`.
fn insert_tags(
    tx: &Transaction<'_>,
    id: FileId,
    meta: &FileInsertMeta,
) -> Result<(), FileStoreError> {
    let mut stmt = tx
        .prepare_cached("INSERT INTO tags (fid, tag) VALUES (?1, ?2)")
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    for tag in meta.distinct_tags() {
        stmt.execute(params![id.get(), tag]).map_err(|err| FileStoreError::Db(err.to_string()))?;
    }
    Ok(())
}

/// Streams `data` into chunk rows and returns the total byte count.
fn insert_chunks<R: Read>(
    tx: &Transaction<'_>,
    id: FileId,
    data: &mut R,
    budget: ChunkBudget,
) -> Result<i64, FileStoreError> {
    let mut stmt = tx
        .prepare_cached("INSERT INTO chunks (fid, seq, length, data) VALUES (?1, ?2, ?3, ?4)")
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    let mut block = vec![0_u8; CHUNK_SIZE];
    let mut total: i64 = 0;
    let mut seq: i64 = 0;
    loop {
        let filled =
            read_block(data, &mut block).map_err(|err| FileStoreError::Io(err.to_string()))?;
        if filled == 0 {
            break;
        }
        let filled_i64 = i64::try_from(filled)
            .map_err(|_| FileStoreError::Io("block size overflow".to_string()))?;
        total = total.saturating_add(filled_i64);
        budget.check(total)?;
        stmt.execute(params![id.get(), seq, filled_i64, &block[.. filled]])
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        seq += 1;
        if filled < CHUNK_SIZE {
            break;
        }
    }
    Ok(total)
}

/// Fills `block` from `data`, stopping early only at end of stream.
fn read_block<R: Read>(data: &mut R, block: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match data.read(&mut block[filled ..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
