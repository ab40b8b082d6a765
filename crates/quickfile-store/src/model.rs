// crates/quickfile-store/src/model.rs
// ============================================================================
// Module: Store Data Model
// Description: File identifiers, records, upload requests, and report types.
// Purpose: Shared value types exchanged with store callers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Timestamps are unix epoch milliseconds. A `None` expiry means the file
//! never expires. Tags are modeled as a set; insertion order is not kept.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

/// Size in bytes of every stored chunk except possibly the last one.
pub const CHUNK_SIZE: usize = 65_536;

/// Opaque, monotonically assigned file identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(i64);

impl FileId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload request attributes supplied alongside the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInsertMeta {
    /// Display filename; its extension drives MIME resolution.
    pub filename: String,
    /// Owning account.
    pub account: String,
    /// Free-text tags; duplicates collapse.
    pub tags: Vec<String>,
    /// Time until the file expires, measured from insertion.
    pub expire: Duration,
    /// Optional unlisted bucket label.
    pub bucket: Option<String>,
}

impl FileInsertMeta {
    /// Returns the distinct tag set.
    #[must_use]
    pub fn distinct_tags(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }
}

/// Metadata describing one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File identifier.
    pub id: FileId,
    /// Display filename.
    pub name: String,
    /// Owning account.
    pub account: String,
    /// Resolved MIME type.
    pub mime: String,
    /// Creation time (unix ms).
    pub created_at: i64,
    /// Expiry time (unix ms); `None` never expires.
    pub expire_at: Option<i64>,
    /// Unlisted bucket label.
    pub bucket: Option<String>,
    /// Total byte length.
    pub length: i64,
    /// Distinct tags.
    pub tags: BTreeSet<String>,
}

impl FileRecord {
    /// Returns true when the file is logically deleted at `now` (unix ms).
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at.is_some_and(|expire| expire <= now)
    }
}

/// Live file count and byte total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of live files.
    pub count: i64,
    /// Sum of live file lengths.
    pub total_size: i64,
}

impl Statistics {
    /// Number of listing pages of `page_size` needed to show every live file.
    #[must_use]
    pub fn page_count(&self, page_size: u32) -> i64 {
        if page_size == 0 || self.count <= 0 {
            return 0;
        }
        let page_size = i64::from(page_size);
        (self.count + page_size - 1) / page_size
    }
}

/// Row counts removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    /// Expired metadata rows deleted.
    pub deleted_files: i64,
    /// Orphaned chunk rows deleted.
    pub deleted_chunks: i64,
    /// Orphaned tag rows deleted.
    pub deleted_tags: i64,
}

impl CleanupStats {
    /// Returns true when nothing was deleted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.deleted_files == 0 && self.deleted_chunks == 0 && self.deleted_tags == 0
    }
}

/// Outcome of a vacuum attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacuumStats {
    /// Whether a compaction ran.
    pub vacuumed: bool,
    /// Store size in bytes before compaction.
    pub old_size: i64,
    /// Store size in bytes after compaction.
    pub new_size: i64,
}

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Converts a duration to whole milliseconds, saturating.
#[must_use]
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions and debug output.
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
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use std::collections::BTreeSet;
    use std::time::Duration;

    use super::FileId;
    use super::FileInsertMeta;
    use super::FileRecord;
    use super::Statistics;

    #[test]
    fn page_count_rounds_up() {
        let stats = Statistics {
            count: 21,
            total_size: 0,
        };
        assert_eq!(stats.page_count(10), 3);
        assert_eq!(stats.page_count(21), 1);
        assert_eq!(stats.page_count(0), 0);
        assert_eq!(Statistics::default().page_count(10), 0);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let record = FileRecord {
            id: FileId::new(1),
            name: "a.txt".to_string(),
            account: "acct".to_string(),
            mime: "text/plain".to_string(),
            created_at: 100,
            expire_at: Some(200),
            bucket: None,
            length: 0,
            tags: BTreeSet::new(),
        };
        assert!(!record.is_expired(199));
        assert!(record.is_expired(200));
        let forever = FileRecord {
            expire_at: None,
            ..record
        };
        assert!(!forever.is_expired(i64::MAX));
    }

    #[test]
    fn distinct_tags_collapse_duplicates() {
        let meta = FileInsertMeta {
            filename: "x.bin".to_string(),
            account: "acct".to_string(),
            tags: vec!["a".to_string(), "a".to_string(), "b".to_string()],
            expire: Duration::from_secs(60),
            bucket: None,
        };
        assert_eq!(meta.distinct_tags(), BTreeSet::from(["a", "b"]));
    }
}
