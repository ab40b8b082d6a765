// crates/quickfile-config/src/config.rs
// ============================================================================
// Module: Quickfile Configuration
// Description: Configuration loading and validation for the Quickfile store.
// Purpose: Provide strict config parsing with hard limits and safe defaults.
// Dependencies: quickfile-store, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown keys are rejected. When no path is given and the default file does
//! not exist, the built-in defaults apply; an explicitly named file that is
//! missing is an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use quickfile_store::AccountLimits;
use quickfile_store::SqliteStoreConfig;
use quickfile_store::UploadPolicy;
use quickfile_store::config::DEFAULT_ACCOUNT_FILE_LIMIT;
use quickfile_store::config::DEFAULT_ACCOUNT_UPLOAD_LIMIT;
use quickfile_store::config::DEFAULT_MAX_EXPIRE;
use quickfile_store::config::DEFAULT_MAX_FILE_TAGS;
use quickfile_store::config::DEFAULT_MAX_FILENAME_LENGTH;
use quickfile_store::config::DEFAULT_MAX_UPLOAD_BYTES;
use quickfile_store::config::DEFAULT_MIN_EXPIRE;
use quickfile_store::config::DEFAULT_TOTAL_UPLOAD_LIMIT;
use quickfile_store::config::default_mime_type_redirect;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "quickfile.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "QUICKFILE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound on the busy timeout (ms).
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Upper bound on pooled read connections.
const MAX_READ_POOL_SIZE: usize = 64;
/// Default expiry applied when an upload does not request one (24 h).
const DEFAULT_EXPIRE_SECS: u64 = 24 * 60 * 60;
/// Default maintenance interval (10 min).
const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 10 * 60;
/// Default vacuum threshold in bytes (100 MB of slack).
const DEFAULT_VACUUM_THRESHOLD: i64 = 100_000_000;
/// Maximum number of configured accounts.
const MAX_ACCOUNTS: usize = 10_000;
/// Maximum entries in each MIME list or map.
const MAX_MIME_RULES: usize = 1_024;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Quickfile configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickfileConfig {
    /// Database settings.
    #[serde(default)]
    pub store: SqliteStoreConfig,
    /// System and default account limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// MIME resolution rules.
    #[serde(default)]
    pub mime: MimeConfig,
    /// Background maintenance settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Accounts allowed to upload, with optional per-account overrides.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl QuickfileConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: `path`, then `QUICKFILE_CONFIG`, then
    /// `quickfile.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, required) = resolve_path(path)?;
        validate_path(&resolved)?;
        let Some(content) = read_config_file(&resolved, required)? else {
            return Ok(Self::default());
        };
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        self.limits.validate()?;
        self.mime.validate()?;
        self.maintenance.validate()?;
        if self.accounts.len() > MAX_ACCOUNTS {
            return Err(ConfigError::Invalid("too many accounts".to_string()));
        }
        for (name, account) in &self.accounts {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("account names must be non-empty".to_string()));
            }
            account.validate(name, &self.limits)?;
        }
        Ok(())
    }

    /// Returns the `SQLite` settings for the store.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        self.store.clone()
    }

    /// Builds the upload policy with every account's limits resolved.
    #[must_use]
    pub fn upload_policy(&self) -> UploadPolicy {
        let accounts = self
            .accounts
            .iter()
            .map(|(name, account)| (name.clone(), account.resolve(&self.limits)))
            .collect();
        UploadPolicy {
            accounts,
            total_upload_limit: self.limits.total_upload_limit,
            max_upload_bytes: self.limits.max_upload_bytes,
            max_file_tags: self.limits.max_file_tags,
            max_filename_length: self.limits.max_filename_length,
            mime_type_redirect: self.mime.redirect.clone(),
            allowed_mime_types: self.mime.allow.clone(),
            denied_mime_types: self.mime.deny.clone(),
        }
    }

    /// Expiry used for uploads that do not request one.
    #[must_use]
    pub const fn default_expire(&self) -> Duration {
        Duration::from_secs(self.limits.default_expire_secs)
    }

    /// Interval between background maintenance cycles.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance.interval_secs)
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Validates the `[store]` section, which deserializes straight into the
/// store's own [`SqliteStoreConfig`].
fn validate_store(store: &SqliteStoreConfig) -> Result<(), ConfigError> {
    let text = store.path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store.path must be non-empty".to_string()));
    }
    validate_path(&store.path)?;
    if store.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "store.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
        )));
    }
    if store.read_pool_size == 0 || store.read_pool_size > MAX_READ_POOL_SIZE {
        return Err(ConfigError::Invalid(format!(
            "store.read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// `[limits]` section: system limits and the default account limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum live bytes across all accounts.
    #[serde(default = "default_total_upload_limit")]
    pub total_upload_limit: i64,
    /// Optional cap on a single upload.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: Option<i64>,
    /// Default per-account byte limit.
    #[serde(default = "default_account_upload_limit")]
    pub upload_limit: i64,
    /// Default per-account live file limit.
    #[serde(default = "default_account_file_limit")]
    pub file_limit: i64,
    /// Maximum distinct tags per file.
    #[serde(default = "default_max_file_tags")]
    pub max_file_tags: usize,
    /// Maximum filename length in bytes.
    #[serde(default = "default_max_filename_length")]
    pub max_filename_length: usize,
    /// Expiry used when an upload does not request one.
    #[serde(default = "default_expire_secs")]
    pub default_expire_secs: u64,
    /// Default minimum expiry.
    #[serde(default = "default_min_expire_secs")]
    pub min_expire_secs: u64,
    /// Default maximum expiry.
    #[serde(default = "default_max_expire_secs")]
    pub max_expire_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            total_upload_limit: DEFAULT_TOTAL_UPLOAD_LIMIT,
            max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
            upload_limit: DEFAULT_ACCOUNT_UPLOAD_LIMIT,
            file_limit: DEFAULT_ACCOUNT_FILE_LIMIT,
            max_file_tags: DEFAULT_MAX_FILE_TAGS,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
            default_expire_secs: DEFAULT_EXPIRE_SECS,
            min_expire_secs: DEFAULT_MIN_EXPIRE.as_secs(),
            max_expire_secs: DEFAULT_MAX_EXPIRE.as_secs(),
        }
    }
}

impl LimitsConfig {
    /// Validates limit ranges and expiry ordering.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.total_upload_limit <= 0 {
            return Err(ConfigError::Invalid(
                "limits.total_upload_limit must be greater than zero".to_string(),
            ));
        }
        if matches!(self.max_upload_bytes, Some(limit) if limit <= 0) {
            return Err(ConfigError::Invalid(
                "limits.max_upload_bytes must be greater than zero when set".to_string(),
            ));
        }
        validate_account_limits("limits", self.upload_limit, self.file_limit)?;
        if self.max_filename_length == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_filename_length must be greater than zero".to_string(),
            ));
        }
        if self.min_expire_secs > self.max_expire_secs {
            return Err(ConfigError::Invalid(
                "limits.min_expire_secs exceeds limits.max_expire_secs".to_string(),
            ));
        }
        if self.default_expire_secs < self.min_expire_secs
            || self.default_expire_secs > self.max_expire_secs
        {
            return Err(ConfigError::Invalid(
                "limits.default_expire_secs must lie within the expiry bounds".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Accounts
// ============================================================================

/// `[accounts.<name>]` entry; unset fields take the `[limits]` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Byte limit override.
    #[serde(default)]
    pub upload_limit: Option<i64>,
    /// Live file limit override.
    #[serde(default)]
    pub file_limit: Option<i64>,
    /// Minimum expiry override.
    #[serde(default)]
    pub min_expire_secs: Option<u64>,
    /// Maximum expiry override.
    #[serde(default)]
    pub max_expire_secs: Option<u64>,
}

impl AccountConfig {
    /// Resolves this entry against the defaults.
    #[must_use]
    pub fn resolve(&self, defaults: &LimitsConfig) -> AccountLimits {
        AccountLimits {
            upload_limit: self.upload_limit.unwrap_or(defaults.upload_limit),
            file_limit: self.file_limit.unwrap_or(defaults.file_limit),
            min_expire: Duration::from_secs(
                self.min_expire_secs.unwrap_or(defaults.min_expire_secs),
            ),
            max_expire: Duration::from_secs(
                self.max_expire_secs.unwrap_or(defaults.max_expire_secs),
            ),
        }
    }

    /// Validates the resolved limits.
    fn validate(&self, name: &str, defaults: &LimitsConfig) -> Result<(), ConfigError> {
        let resolved = self.resolve(defaults);
        validate_account_limits(
            &format!("accounts.{name}"),
            resolved.upload_limit,
            resolved.file_limit,
        )?;
        if resolved.min_expire > resolved.max_expire {
            return Err(ConfigError::Invalid(format!(
                "accounts.{name}: minimum expiry exceeds maximum expiry"
            )));
        }
        Ok(())
    }
}

/// Rejects non-positive byte or file limits.
fn validate_account_limits(
    field: &str,
    upload_limit: i64,
    file_limit: i64,
) -> Result<(), ConfigError> {
    if upload_limit <= 0 {
        return Err(ConfigError::Invalid(format!("{field}.upload_limit must be greater than zero")));
    }
    if file_limit <= 0 {
        return Err(ConfigError::Invalid(format!("{field}.file_limit must be greater than zero")));
    }
    Ok(())
}

// ============================================================================
// SECTION: MIME
// ============================================================================

/// `[mime]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MimeConfig {
    /// Rewrites applied after extension lookup (`""` is the unknown type).
    #[serde(default = "default_mime_type_redirect")]
    pub redirect: BTreeMap<String, String>,
    /// Allowed type prefixes; empty allows everything not denied.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Denied type prefixes.
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            redirect: default_mime_type_redirect(),
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

impl MimeConfig {
    /// Validates list sizes and entries.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.redirect.len() > MAX_MIME_RULES
            || self.allow.len() > MAX_MIME_RULES
            || self.deny.len() > MAX_MIME_RULES
        {
            return Err(ConfigError::Invalid("too many mime rules".to_string()));
        }
        if self.redirect.values().any(|target| target.trim().is_empty()) {
            return Err(ConfigError::Invalid("mime.redirect targets must be non-empty".to_string()));
        }
        if self.allow.iter().chain(self.deny.iter()).any(|entry| entry.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "mime.allow and mime.deny entries must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Maintenance
// ============================================================================

/// `[maintenance]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Seconds between cleanup + vacuum cycles.
    #[serde(default = "default_maintenance_interval_secs")]
    pub interval_secs: u64,
    /// Slack in bytes that triggers a vacuum; zero or less disables it.
    #[serde(default = "default_vacuum_threshold")]
    pub vacuum_threshold: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_MAINTENANCE_INTERVAL_SECS,
            vacuum_threshold: DEFAULT_VACUUM_THRESHOLD,
        }
    }
}

impl MaintenanceConfig {
    /// Validates the maintenance interval.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "maintenance.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default system byte limit.
const fn default_total_upload_limit() -> i64 {
    DEFAULT_TOTAL_UPLOAD_LIMIT
}

/// Default single-upload cap.
const fn default_max_upload_bytes() -> Option<i64> {
    Some(DEFAULT_MAX_UPLOAD_BYTES)
}

/// Default account byte limit.
const fn default_account_upload_limit() -> i64 {
    DEFAULT_ACCOUNT_UPLOAD_LIMIT
}

/// Default account file limit.
const fn default_account_file_limit() -> i64 {
    DEFAULT_ACCOUNT_FILE_LIMIT
}

/// Default tag maximum.
const fn default_max_file_tags() -> usize {
    DEFAULT_MAX_FILE_TAGS
}

/// Default filename length maximum.
const fn default_max_filename_length() -> usize {
    DEFAULT_MAX_FILENAME_LENGTH
}

/// Default upload expiry.
const fn default_expire_secs() -> u64 {
    DEFAULT_EXPIRE_SECS
}

/// Default minimum expiry.
const fn default_min_expire_secs() -> u64 {
    DEFAULT_MIN_EXPIRE.as_secs()
}

/// Default maximum expiry.
const fn default_max_expire_secs() -> u64 {
    DEFAULT_MAX_EXPIRE.as_secs()
}

/// Default maintenance interval.
const fn default_maintenance_interval_secs() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_SECS
}

/// Default vacuum threshold.
const fn default_vacuum_threshold() -> i64 {
    DEFAULT_VACUUM_THRESHOLD
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; the flag reports whether it was named explicitly.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}

/// Reads a config file; a missing optional file yields `None`.
fn read_config_file(path: &Path, required: bool) -> Result<Option<String>, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound && !required => return Ok(None),
        Err(err) => return Err(ConfigError::Io(format!("{}: {err}", path.display()))),
    };
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))
}
