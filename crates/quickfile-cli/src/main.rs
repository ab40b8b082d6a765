// crates/quickfile-cli/src/main.rs
// ============================================================================
// Module: Quickfile CLI Entry Point
// Description: Operator commands for the chunked file store.
// Purpose: Upload, inspect, download, expire, and maintain stored files.
// Dependencies: clap, quickfile-config, quickfile-store, serde_json, tracing
// ============================================================================

//! ## Overview
//! `quickfile` opens the store described by `quickfile.toml` and runs one
//! command against it. Structured results go to stdout as JSON; file bytes
//! from `get` go to stdout or a file; logs go to stderr, filtered by
//! `RUST_LOG` (default `info`).

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use quickfile_config::QuickfileConfig;
use quickfile_store::FileId;
use quickfile_store::FileInsertMeta;
use quickfile_store::FileRecord;
use quickfile_store::Maintenance;
use quickfile_store::MaintenanceWorker;
use quickfile_store::SCHEMA_VERSION;
use quickfile_store::SqliteFileStore;
use quickfile_store::model::unix_millis;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest single sleep while `maintain` waits for its deadline.
const WAIT_STEP: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "quickfile", version, about = "Chunked file store backed by SQLite")]
struct Cli {
    /// Path to quickfile.toml (defaults to `QUICKFILE_CONFIG` or ./quickfile.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store and its schema if missing.
    Init,
    /// Show live file count and bytes.
    Stats(StatsCommand),
    /// List live files, newest first.
    List(ListCommand),
    /// Show one file's metadata.
    Info(IdCommand),
    /// Upload a file.
    Put(PutCommand),
    /// Download a file.
    Get(GetCommand),
    /// Expire a file immediately.
    Expire(IdCommand),
    /// Delete expired files and their chunks.
    Cleanup,
    /// Compact the store when enough space is free.
    Vacuum(VacuumCommand),
    /// Run cleanup and vacuum on the configured interval.
    Maintain(MaintainCommand),
}

/// Arguments for `stats`.
#[derive(Args, Debug)]
struct StatsCommand {
    /// Restrict to one account.
    #[arg(long)]
    account: Option<String>,
    /// Also report how many pages of this size a listing needs.
    #[arg(long, value_name = "N")]
    page_size: Option<u32>,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
struct ListCommand {
    /// Zero-based page index.
    #[arg(long, default_value_t = 0)]
    page: u32,
    /// Files per page.
    #[arg(long, default_value_t = 20)]
    page_size: u32,
    /// Unlisted bucket to show instead of unbucketed files.
    #[arg(long)]
    bucket: Option<String>,
    /// Restrict to one account.
    #[arg(long)]
    account: Option<String>,
}

/// Arguments naming a single file.
#[derive(Args, Debug)]
struct IdCommand {
    /// File identifier.
    id: i64,
}

/// Arguments for `put`.
#[derive(Args, Debug)]
struct PutCommand {
    /// Source file, or `-` for stdin.
    source: PathBuf,
    /// Uploading account.
    #[arg(long)]
    account: String,
    /// Stored filename (defaults to the source file name).
    #[arg(long)]
    name: Option<String>,
    /// Tag to attach; repeatable.
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,
    /// Seconds until expiry (defaults to `limits.default_expire_secs`).
    #[arg(long, value_name = "SECS")]
    expire_secs: Option<u64>,
    /// Unlisted bucket label.
    #[arg(long)]
    bucket: Option<String>,
}

/// Arguments for `get`.
#[derive(Args, Debug)]
struct GetCommand {
    /// File identifier.
    id: i64,
    /// Byte offset to start from.
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// Destination path (defaults to stdout).
    #[arg(long, short)]
    output: Option<PathBuf>,
}

/// Arguments for `vacuum`.
#[derive(Args, Debug)]
struct VacuumCommand {
    /// Slack in bytes required to compact (defaults to the configured value).
    #[arg(long)]
    threshold: Option<i64>,
}

/// Arguments for `maintain`.
#[derive(Args, Debug)]
struct MaintainCommand {
    /// Run a single cycle and exit.
    #[arg(long, conflicts_with = "duration_secs")]
    once: bool,
    /// Stop the worker after this many seconds (runs until terminated otherwise).
    #[arg(long, value_name = "SECS")]
    duration_secs: Option<u64>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Executes the command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = QuickfileConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let store = open_store(&config)?;
    match cli.command {
        Commands::Init => command_init(&config),
        Commands::Stats(command) => command_stats(&store, &command),
        Commands::List(command) => command_list(&store, &command),
        Commands::Info(command) => command_info(&store, &command),
        Commands::Put(command) => command_put(&store, &config, &command),
        Commands::Get(command) => command_get(&store, &command),
        Commands::Expire(command) => command_expire(&store, &command),
        Commands::Cleanup => command_cleanup(store),
        Commands::Vacuum(command) => command_vacuum(store, &config, &command),
        Commands::Maintain(command) => command_maintain(store, &config, &command),
    }
}

/// Opens the store described by `config`.
fn open_store(config: &QuickfileConfig) -> CliResult<SqliteFileStore> {
    SqliteFileStore::new(config.store_config(), config.upload_policy()).map_err(|err| {
        if err.is_fatal() {
            let path = config.store.path.display();
            CliError::new(format!("refusing to use store at {path}: {err}"))
        } else {
            CliError::new(format!("failed to open store: {err}"))
        }
    })
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Summary printed by `init`.
#[derive(Serialize)]
struct InitReport<'a> {
    /// Database path.
    path: &'a Path,
    /// Schema version in use.
    schema_version: i64,
}

/// Executes `init`; opening the store already created the schema.
fn command_init(config: &QuickfileConfig) -> CliResult<ExitCode> {
    write_json(&InitReport {
        path: &config.store.path,
        schema_version: SCHEMA_VERSION,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Statistics plus optional page count.
#[derive(Serialize)]
struct StatsReport {
    /// Live file count.
    count: i64,
    /// Live byte total.
    total_size: i64,
    /// Listing pages at the requested page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<i64>,
}

/// Executes `stats`.
fn command_stats(store: &SqliteFileStore, command: &StatsCommand) -> CliResult<ExitCode> {
    let stats = store.statistics(command.account.as_deref()).map_err(store_error)?;
    write_json(&StatsReport {
        count: stats.count,
        total_size: stats.total_size,
        pages: command.page_size.map(|size| stats.page_count(size)),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `list`.
fn command_list(store: &SqliteFileStore, command: &ListCommand) -> CliResult<ExitCode> {
    let ids = store
        .list_page(
            command.page,
            command.page_size,
            command.bucket.as_deref(),
            command.account.as_deref(),
        )
        .map_err(store_error)?;
    let mut records = store.get_by_ids(&ids).map_err(store_error)?;
    let ordered = ids.iter().filter_map(|id| records.remove(id)).collect::<Vec<_>>();
    write_json(&ordered)?;
    Ok(ExitCode::SUCCESS)
}

/// Record plus its expiry state at lookup time.
#[derive(Serialize)]
struct RecordView<'a> {
    /// Stored metadata.
    #[serde(flatten)]
    record: &'a FileRecord,
    /// Whether the file is already logically deleted.
    expired: bool,
}

/// Executes `info`.
fn command_info(store: &SqliteFileStore, command: &IdCommand) -> CliResult<ExitCode> {
    let record = store.get_by_id(FileId::new(command.id)).map_err(store_error)?;
    write_json(&RecordView {
        record: &record,
        expired: record.is_expired(unix_millis()),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `put`.
fn command_put(
    store: &SqliteFileStore,
    config: &QuickfileConfig,
    command: &PutCommand,
) -> CliResult<ExitCode> {
    let meta = FileInsertMeta {
        filename: upload_name(&command.source, command.name.as_deref())?,
        account: command.account.clone(),
        tags: command.tags.clone(),
        expire: command.expire_secs.map_or_else(|| config.default_expire(), Duration::from_secs),
        bucket: command.bucket.clone(),
    };
    let inserted = if is_stdin(&command.source) {
        store.insert(&meta, io::stdin().lock())
    } else {
        let file = File::open(&command.source).map_err(|err| {
            CliError::new(format!("failed to open {}: {err}", command.source.display()))
        })?;
        store.insert(&meta, file)
    };
    let record = inserted.map_err(store_error)?;
    write_json(&record)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `get`.
fn command_get(store: &SqliteFileStore, command: &GetCommand) -> CliResult<ExitCode> {
    let mut reader = store.open_reader(FileId::new(command.id)).map_err(store_error)?;
    reader
        .seek(SeekFrom::Start(command.offset))
        .map_err(|err| CliError::new(format!("failed to seek: {err}")))?;
    match &command.output {
        Some(path) => {
            let mut file = File::create(path).map_err(|err| {
                CliError::new(format!("failed to create {}: {err}", path.display()))
            })?;
            copy_stream(&mut reader, &mut file)?;
        }
        None => {
            copy_stream(&mut reader, &mut io::stdout().lock())?;
        }
    }
    reader.close().map_err(store_error)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `expire`.
fn command_expire(store: &SqliteFileStore, command: &IdCommand) -> CliResult<ExitCode> {
    store.expire_now(FileId::new(command.id)).map_err(store_error)?;
    let record = store.get_by_id(FileId::new(command.id)).map_err(store_error)?;
    write_json(&record)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `cleanup`.
fn command_cleanup(store: SqliteFileStore) -> CliResult<ExitCode> {
    let stats = Maintenance::new(store).cleanup_expired().map_err(store_error)?;
    write_json(&stats)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `vacuum`.
fn command_vacuum(
    store: SqliteFileStore,
    config: &QuickfileConfig,
    command: &VacuumCommand,
) -> CliResult<ExitCode> {
    let threshold = command.threshold.unwrap_or(config.maintenance.vacuum_threshold);
    let stats = Maintenance::new(store).try_vacuum(threshold).map_err(store_error)?;
    write_json(&stats)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `maintain`: one cycle, or a background worker for the requested
/// duration (or until the process is terminated).
fn command_maintain(
    store: SqliteFileStore,
    config: &QuickfileConfig,
    command: &MaintainCommand,
) -> CliResult<ExitCode> {
    let maintenance = Arc::new(Maintenance::new(store));
    let threshold = config.maintenance.vacuum_threshold;
    if command.once {
        let report = maintenance.run_cycle(threshold).map_err(store_error)?;
        write_json(&report)?;
        return Ok(ExitCode::SUCCESS);
    }
    let worker = MaintenanceWorker::spawn(maintenance, config.maintenance_interval(), threshold)
        .map_err(store_error)?;
    tracing::info!(
        interval_secs = config.maintenance.interval_secs,
        vacuum_threshold = threshold,
        duration_secs = command.duration_secs,
        "maintenance worker running"
    );
    wait_for(command.duration_secs.map(Duration::from_secs));
    worker.shutdown().map_err(store_error)?;
    tracing::info!("maintenance worker stopped");
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sleeps until `limit` has elapsed; `None` sleeps until the process is killed.
fn wait_for(limit: Option<Duration>) {
    let started = Instant::now();
    while limit.is_none_or(|limit| started.elapsed() < limit) {
        let remaining = limit.map_or(WAIT_STEP, |limit| limit.saturating_sub(started.elapsed()));
        thread::sleep(remaining.min(WAIT_STEP));
    }
}

/// Returns true when `path` selects stdin.
fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Chooses the stored filename for an upload.
fn upload_name(source: &Path, name: Option<&str>) -> CliResult<String> {
    if let Some(name) = name {
        return Ok(name.to_string());
    }
    if is_stdin(source) {
        return Err(CliError::new("--name is required when reading from stdin".to_string()));
    }
    source
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::new(format!("cannot derive a filename from {}", source.display())))
}

/// Copies a reader to a writer and flushes.
fn copy_stream<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> CliResult<u64> {
    let copied = io::copy(reader, writer)
        .map_err(|err| CliError::new(format!("failed to copy file: {err}")))?;
    writer.flush().map_err(|err| CliError::new(output_error("output", &err)))?;
    Ok(copied)
}

/// Maps a store error to a CLI error.
fn store_error(err: quickfile_store::FileStoreError) -> CliError {
    CliError::new(err.to_string())
}

/// Writes pretty JSON followed by a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    write_stdout_line(&text).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> io::Result<()> {
    let mut stderr = io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(&format!("error: {message}"));
    ExitCode::FAILURE
}
