// crates/quickfile-config/src/lib.rs
// ============================================================================
// Module: Quickfile Config Library
// Description: Canonical config model and validation for quickfile.toml.
// Purpose: Single source of truth for store, quota, and maintenance settings.
// Dependencies: quickfile-store, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! `quickfile-config` parses `quickfile.toml`, rejects unknown keys and
//! out-of-range values, and resolves per-account overrides into the
//! [`quickfile_store::UploadPolicy`] the store enforces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
