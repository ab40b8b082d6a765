// crates/quickfile-store/src/config.rs
// ============================================================================
// Module: Store Configuration
// Description: SQLite connection settings and upload quota policy.
// Purpose: Describe how the store opens SQLite and which uploads it accepts.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`SqliteStoreConfig`] controls how connections are opened. [`UploadPolicy`]
//! carries the resolved per-account limits and MIME rules consumed by the
//! precheck and the streaming writer. Both are plain data; loading them from
//! TOML is the job of the `quickfile-config` crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::FileStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default database path, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = "quickfile.db";
/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of pooled read connections.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Default system-wide byte limit across all live files (1 GB).
pub const DEFAULT_TOTAL_UPLOAD_LIMIT: i64 = 1_000_000_000;
/// Default per-account byte limit.
pub const DEFAULT_ACCOUNT_UPLOAD_LIMIT: i64 = 100_000_000;
/// Default per-account live file limit.
pub const DEFAULT_ACCOUNT_FILE_LIMIT: i64 = 1_000;
/// Default maximum size of a single upload.
pub const DEFAULT_MAX_UPLOAD_BYTES: i64 = 100_000_000;
/// Default maximum distinct tags on one file.
pub const DEFAULT_MAX_FILE_TAGS: usize = 10;
/// Default maximum filename length in bytes.
pub const DEFAULT_MAX_FILENAME_LENGTH: usize = 256;
/// Default minimum expiry duration.
pub const DEFAULT_MIN_EXPIRE: Duration = Duration::from_secs(5 * 60);
/// Default maximum expiry duration.
pub const DEFAULT_MAX_EXPIRE: Duration = Duration::from_secs(72 * 60 * 60);
/// MIME type reported for extensions with no known type.
pub const UNKNOWN_MIME_TYPE: &str = "";
/// Generic binary MIME type.
pub const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

// ============================================================================
// SECTION: SQLite Settings
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended; readers never block the writer).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` file store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of connections used for metadata and statistics reads.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default tuning for the given database path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }

    /// Validates runtime limits.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Invalid`] when a limit is out of range.
    pub fn validate(&self) -> Result<(), FileStoreError> {
        if self.read_pool_size == 0 {
            return Err(FileStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self::for_path(DEFAULT_STORE_PATH)
    }
}

/// Returns the default database path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

// ============================================================================
// SECTION: Upload Policy
// ============================================================================

/// Resolved quota limits for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLimits {
    /// Maximum live bytes owned by the account.
    pub upload_limit: i64,
    /// Maximum live files owned by the account.
    pub file_limit: i64,
    /// Shortest expiry duration the account may request.
    pub min_expire: Duration,
    /// Longest expiry duration the account may request.
    pub max_expire: Duration,
}

impl Default for AccountLimits {
    fn default() -> Self {
        Self {
            upload_limit: DEFAULT_ACCOUNT_UPLOAD_LIMIT,
            file_limit: DEFAULT_ACCOUNT_FILE_LIMIT,
            min_expire: DEFAULT_MIN_EXPIRE,
            max_expire: DEFAULT_MAX_EXPIRE,
        }
    }
}

/// Upload acceptance rules shared by the precheck and the writer.
///
/// # Invariants
/// - Only accounts present in `accounts` may upload.
/// - MIME allow/deny entries match by prefix against the redirected type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Accounts allowed to upload, with their resolved limits.
    pub accounts: BTreeMap<String, AccountLimits>,
    /// Maximum live bytes across every account.
    pub total_upload_limit: i64,
    /// Optional cap on a single upload, enforced while streaming.
    pub max_upload_bytes: Option<i64>,
    /// Maximum distinct tags per file.
    pub max_file_tags: usize,
    /// Maximum filename length in bytes.
    pub max_filename_length: usize,
    /// MIME rewrites applied after extension lookup.
    pub mime_type_redirect: BTreeMap<String, String>,
    /// When non-empty, resolved types must start with one of these.
    pub allowed_mime_types: Vec<String>,
    /// Resolved types must not start with any of these.
    pub denied_mime_types: Vec<String>,
}

impl UploadPolicy {
    /// Returns the limits for `account`, if it may upload.
    #[must_use]
    pub fn account(&self, account: &str) -> Option<&AccountLimits> {
        self.accounts.get(account)
    }

    /// Adds or replaces an account with the given limits.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>, limits: AccountLimits) -> Self {
        self.accounts.insert(account.into(), limits);
        self
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            total_upload_limit: DEFAULT_TOTAL_UPLOAD_LIMIT,
            max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
            max_file_tags: DEFAULT_MAX_FILE_TAGS,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
            mime_type_redirect: default_mime_type_redirect(),
            allowed_mime_types: Vec::new(),
            denied_mime_types: Vec::new(),
        }
    }
}

/// Returns the default MIME redirects (unknown and HTML become inert types).
#[must_use]
pub fn default_mime_type_redirect() -> BTreeMap<String, String> {
    BTreeMap::from([
        (UNKNOWN_MIME_TYPE.to_string(), OCTET_STREAM_MIME_TYPE.to_string()),
        ("text/html".to_string(), "text/plain".to_string()),
    ])
}
