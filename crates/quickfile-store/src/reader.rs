// crates/quickfile-store/src/reader.rs
// ============================================================================
// Module: Seekable Chunk Reader
// Description: Random-access byte stream over a stored file's chunk rows.
// Purpose: Serve downloads and ranged reads holding at most one chunk.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! A [`ChunkReader`] owns its own connection and cursor. Chunk `n` covers
//! bytes `n * CHUNK_SIZE ..`, so any offset maps to exactly one chunk row.
//! Reads fetch lazily; seeks only move the cursor and drop the buffer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::error::FileStoreError;
use crate::model::CHUNK_SIZE;
use crate::model::FileId;
use crate::schema::open_connection;
use crate::store::SqliteFileStore;

/// [`CHUNK_SIZE`] widened for offset arithmetic.
const CHUNK_SIZE_U64: u64 = CHUNK_SIZE as u64;

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Read + seek handle over one stored file.
///
/// # Invariants
/// - `buffer[position ..]` holds the bytes starting at `offset`, or is empty.
/// - The buffer never holds more than one chunk.
pub struct ChunkReader {
    /// Dedicated connection released on close.
    connection: Connection,
    /// File being read.
    file_id: FileId,
    /// Total file length captured at open.
    length: u64,
    /// Logical read position.
    offset: u64,
    /// Most recently fetched chunk.
    buffer: Vec<u8>,
    /// Start of the unread tail inside `buffer`.
    position: usize,
}

impl SqliteFileStore {
    /// Opens a seekable reader over a stored file.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::NotFound`] for an unknown id, or a storage
    /// error when the connection cannot be opened.
    pub fn open_reader(&self, id: FileId) -> Result<ChunkReader, FileStoreError> {
        let connection = open_connection(&self.config)?;
        let length: Option<i64> = connection
            .query_row("SELECT length FROM meta WHERE fid = ?1", params![id.get()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| FileStoreError::Db(err.to_string()))?;
        let Some(length) = length else {
            return Err(FileStoreError::NotFound(id.to_string()));
        };
        let length = u64::try_from(length)
            .map_err(|_| FileStoreError::Db(format!("negative length for file {id}")))?;
        Ok(ChunkReader {
            connection,
            file_id: id,
            length,
            offset: 0,
            buffer: Vec::new(),
            position: 0,
        })
    }
}

impl ChunkReader {
    /// File this reader serves.
    #[must_use]
    pub const fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Total file length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.length
    }

    /// Returns true for a zero-length file.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current logical offset.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Releases the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Db`] when `SQLite` refuses to close.
    pub fn close(self) -> Result<(), FileStoreError> {
        self.connection.close().map_err(|(_, err)| FileStoreError::Db(err.to_string()))
    }

    /// Drops any buffered chunk.
    fn discard_buffer(&mut self) {
        self.buffer.clear();
        self.position = 0;
    }

    /// Loads the chunk covering `offset`; returns false at end of stream.
    fn fill_buffer(&mut self) -> io::Result<bool> {
        self.discard_buffer();
        if self.offset >= self.length {
            return Ok(false);
        }
        let seq = i64::try_from(self.offset / CHUNK_SIZE_U64)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let data: Option<Vec<u8>> = self
            .connection
            .prepare_cached("SELECT data FROM chunks WHERE fid = ?1 AND seq = ?2")
            .and_then(|mut stmt| {
                stmt.query_row(params![self.file_id.get(), seq], |row| row.get(0)).optional()
            })
            .map_err(io::Error::other)?;
        let Some(data) = data else {
            return Ok(false);
        };
        let skip = usize::try_from(self.offset % CHUNK_SIZE_U64)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        if skip >= data.len() {
            return Ok(false);
        }
        self.buffer = data;
        self.position = skip;
        Ok(true)
    }
}

impl Read for ChunkReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.position >= self.buffer.len() && !self.fill_buffer()? {
            return Ok(0);
        }
        let available = &self.buffer[self.position ..];
        let count = available.len().min(out.len());
        out[.. count].copy_from_slice(&available[.. count]);
        self.position += count;
        self.offset += count as u64;
        Ok(count)
    }
}

impl Seek for ChunkReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.length) + i128::from(delta),
        };
        let target = u64::try_from(target).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )
        })?;
        self.offset = target;
        self.discard_buffer();
        Ok(target)
    }
}
