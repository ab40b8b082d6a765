// crates/quickfile-store/src/stats.rs
// ============================================================================
// Module: Statistics Aggregator
// Description: Live file count and byte totals.
// Purpose: Feed quota checks, vacuum thresholds, and pagination.
// Dependencies: rusqlite
// ============================================================================

use rusqlite::Connection;
use rusqlite::params;

use crate::error::FileStoreError;
use crate::model::Statistics;

/// Counts live files (`expire IS NULL OR expire > now`), optionally per account.
///
/// Takes a plain connection so it can run inside an open write transaction.
pub(crate) fn query_statistics(
    connection: &Connection,
    account: Option<&str>,
    now: i64,
) -> Result<Statistics, FileStoreError> {
    let (count, total_size) = connection
        .query_row(
            "SELECT COUNT(*), IFNULL(SUM(length), 0) FROM meta \
             WHERE (expire IS NULL OR expire > ?1) AND (?2 IS NULL OR account = ?2)",
            params![now, account],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .map_err(|err| FileStoreError::Db(err.to_string()))?;
    Ok(Statistics {
        count,
        total_size,
    })
}
