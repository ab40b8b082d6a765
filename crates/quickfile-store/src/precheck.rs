// crates/quickfile-store/src/precheck.rs
// ============================================================================
// Module: Quota Precheck
// Description: Static validation of upload requests before any row is written.
// Purpose: Reject bad uploads early and report the remaining account quota.
// Dependencies: mime_guess, rusqlite
// ============================================================================

//! ## Overview
//! Checks run in a fixed order and stop at the first failure:
//! account, tag count, filename, file count, byte usage, expiry bounds,
//! extension, and finally MIME resolution against the redirect, allow, and
//! deny rules. The writer re-runs the same checks inside its transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::path::Path;

use rusqlite::Connection;

use crate::config::UNKNOWN_MIME_TYPE;
use crate::config::UploadPolicy;
use crate::error::FileStoreError;
use crate::model::FileInsertMeta;
use crate::stats::query_statistics;

/// Extension assumed for filenames that do not carry one.
pub const FALLBACK_EXTENSION: &str = "bin";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a successful precheck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecheckOutcome {
    /// MIME type after redirects.
    pub mime: String,
    /// Bytes the account may still store (`limit - usage`).
    pub remaining_bytes: i64,
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Runs every upload check against the current store contents.
pub(crate) fn run_precheck(
    connection: &Connection,
    policy: &UploadPolicy,
    meta: &FileInsertMeta,
    now: i64,
) -> Result<PrecheckOutcome, FileStoreError> {
    let Some(limits) = policy.account(&meta.account) else {
        return Err(FileStoreError::Invalid(format!(
            "account not allowed to upload: {}",
            meta.account
        )));
    };
    let tag_count = meta.distinct_tags().len();
    if tag_count > policy.max_file_tags {
        return Err(FileStoreError::Invalid(format!(
            "too many tags: {tag_count} (max {})",
            policy.max_file_tags
        )));
    }
    if meta.filename.is_empty() {
        return Err(FileStoreError::Invalid("must provide filename".to_string()));
    }
    if meta.filename.len() > policy.max_filename_length {
        return Err(FileStoreError::Invalid(format!(
            "filename too long: {} bytes (max {})",
            meta.filename.len(),
            policy.max_filename_length
        )));
    }

    let usage = query_statistics(connection, Some(&meta.account), now)?;
    if usage.count >= limits.file_limit {
        return Err(FileStoreError::QuotaExceeded(format!(
            "too many files: {} (max {})",
            usage.count, limits.file_limit
        )));
    }
    if usage.total_size >= limits.upload_limit {
        return Err(FileStoreError::QuotaExceeded(format!(
            "over total upload limit: {} (max {})",
            usage.total_size, limits.upload_limit
        )));
    }

    if meta.expire < limits.min_expire || meta.expire > limits.max_expire {
        return Err(FileStoreError::Invalid(format!(
            "invalid expire duration: must be within {}s..={}s",
            limits.min_expire.as_secs(),
            limits.max_expire.as_secs()
        )));
    }

    let mime = resolve_mime(policy, &meta.filename)?;
    Ok(PrecheckOutcome {
        mime,
        remaining_bytes: limits.upload_limit - usage.total_size,
    })
}

/// Resolves the filename's MIME type and applies redirect, allow, and deny rules.
///
/// # Errors
///
/// Returns [`FileStoreError::Invalid`] when the type is unknown, not allowed,
/// or denied.
pub fn resolve_mime(policy: &UploadPolicy, filename: &str) -> Result<String, FileStoreError> {
    let extension = file_extension(filename);
    let guessed = mime_guess::from_ext(extension).first_raw().unwrap_or(UNKNOWN_MIME_TYPE);
    let mime = policy.mime_type_redirect.get(guessed).map_or(guessed, String::as_str);
    if mime.is_empty() {
        return Err(FileStoreError::Invalid(format!("unknown mimetype for extension: {extension}")));
    }
    if !policy.allowed_mime_types.is_empty() && !starts_with_any(mime, &policy.allowed_mime_types) {
        return Err(FileStoreError::Invalid(format!("mimetype not allowed: {mime}")));
    }
    if starts_with_any(mime, &policy.denied_mime_types) {
        return Err(FileStoreError::Invalid(format!("mimetype forbidden: {mime}")));
    }
    Ok(mime.to_string())
}

/// Returns the filename extension, or [`FALLBACK_EXTENSION`] when absent.
fn file_extension(filename: &str) -> &str {
    Path::new(filename)
        .extension()
        .and_then(OsStr::to_str)
        .filter(|ext| !ext.is_empty())
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Prefix match against a list of patterns.
fn starts_with_any(value: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| value.starts_with(prefix.as_str()))
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

    use std::collections::BTreeMap;

    use super::file_extension;
    use super::resolve_mime;
    use crate::config::UploadPolicy;
    use crate::error::FileStoreError;

    #[test]
    fn missing_extension_falls_back_to_binary() {
        assert_eq!(file_extension("whatever"), "bin");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        let mime = resolve_mime(&UploadPolicy::default(), "whatever").unwrap();
        assert_eq!(mime, "application/octet-stream");
    }

    #[test]
    fn html_is_redirected_to_plain_text() {
        let policy = UploadPolicy::default();
        assert_eq!(resolve_mime(&policy, "page.html").unwrap(), "text/plain");
        assert_eq!(resolve_mime(&policy, "thing.png").unwrap(), "image/png");
    }

    #[test]
    fn unknown_extension_without_redirect_is_rejected() {
        let policy = UploadPolicy {
            mime_type_redirect: BTreeMap::new(),
            ..UploadPolicy::default()
        };
        let err = resolve_mime(&policy, "data.notarealext").unwrap_err();
        assert!(matches!(err, FileStoreError::Invalid(_)));
    }

    #[test]
    fn allow_and_deny_lists_match_by_prefix() {
        let policy = UploadPolicy {
            allowed_mime_types: vec!["image/".to_string()],
            denied_mime_types: vec!["image/svg".to_string()],
            ..UploadPolicy::default()
        };
        assert!(resolve_mime(&policy, "a.png").is_ok());
        assert!(resolve_mime(&policy, "a.txt").is_err());
        assert!(resolve_mime(&policy, "a.svg").is_err());
    }
}
