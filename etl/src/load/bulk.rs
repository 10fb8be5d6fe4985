//! Bulk insert fast path for cold loads.
//!
//! Skips existence checks and inserts every row in one transaction. The
//! caller must guarantee that no stored row shares a unique key with the
//! table; the first rejected row rolls back the whole load.

use rusqlite::Connection;
use tracing::{error, info};

use super::upsert::insert_record;
use super::BatchStats;
use crate::error::{LoadError, LoadResult};
use crate::models::{CleanTable, LoadOutcome};

pub fn bulk_insert(conn: &mut Connection, table: &CleanTable) -> LoadResult<BatchStats> {
    info!(records = table.len(), record_type = %table.record_type, "Bulk inserting");

    let tx = conn.transaction().map_err(LoadError::Connection)?;
    let mut stats = BatchStats::new(table.len());

    for record in &table.records {
        match insert_record(&tx, record)? {
            LoadOutcome::Failed(reason) => {
                error!(row = record.row(), %reason, "Bulk insert rejected, rolling back");
                return Err(LoadError::BulkRejected {
                    row: record.row(),
                    reason,
                });
            }
            outcome => stats.tally(record, outcome),
        }
    }

    tx.commit().map_err(LoadError::Connection)?;
    info!(inserted = stats.inserted, "Bulk insert committed");
    Ok(stats)
}
