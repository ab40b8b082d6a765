// crates/quickfile-store/src/lib.rs
// ============================================================================
// Module: Quickfile Store
// Description: Chunked blob storage engine backed by SQLite.
// Purpose: Store, stream, expire, and reclaim uploaded files under quotas.
// Dependencies: mime_guess, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Files are split into fixed-size chunk rows next to a metadata row and a
//! tag set, all in one `SQLite` database. [`SqliteFileStore`] validates and
//! streams uploads inside a single transaction, serves metadata and
//! listings, and hands out seekable [`ChunkReader`]s. [`Maintenance`] deletes
//! expired files and compacts the database once enough space is free.
//!
//! Expiry is the only deletion path: a file whose `expire` timestamp has
//! passed disappears from statistics and listings immediately and is
//! physically removed by the next cleanup.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod maintenance;
pub mod model;
pub mod precheck;
pub mod reader;
pub mod schema;
mod stats;
pub mod store;
mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AccountLimits;
pub use config::SqliteStoreConfig;
pub use config::SqliteStoreMode;
pub use config::SqliteSyncMode;
pub use config::UploadPolicy;
pub use error::FileStoreError;
pub use maintenance::Maintenance;
pub use maintenance::MaintenanceReport;
pub use maintenance::MaintenanceWorker;
pub use model::CHUNK_SIZE;
pub use model::CleanupStats;
pub use model::FileId;
pub use model::FileInsertMeta;
pub use model::FileRecord;
pub use model::Statistics;
pub use model::VacuumStats;
pub use precheck::PrecheckOutcome;
pub use reader::ChunkReader;
pub use schema::SCHEMA_VERSION;
pub use store::SqliteFileStore;
