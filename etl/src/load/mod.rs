//! Loader: idempotent, batched persistence of cleaned tables.
//!
//! - [`upsert`] - per-record upsert and failure classification
//! - [`bulk`] - conflict-free fast path for cold loads
//!
//! [`Loader::load_batch`] upserts records one at a time inside a transaction
//! committed every `batch_size` records. Each record runs under its own
//! savepoint, so a rejected record rolls back only its own statements and
//! the batch carries on. A connection failure aborts the call with
//! [`LoadError::Aborted`]; batches committed before it stay committed and
//! are counted in the error.

pub mod bulk;
pub mod upsert;

pub use bulk::bulk_insert;
pub use upsert::{classify, insert_record, update_sql, upsert_record};

use serde::{Deserialize, Serialize};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::error::{LoadError, LoadResult, RecordError};
use crate::models::{CleanRecord, CleanTable, LoadOutcome};
use crate::store::Store;

/// Default number of records per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// One record that could not be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    /// Row index in the raw input.
    pub row: usize,
    /// Business key (email, course code, or `student/course`).
    pub key: String,
    pub reason: RecordError,
}

/// Aggregate of the outcomes of one load call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<LoadFailure>,
}

impl BatchStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Count one outcome against its record.
    pub fn tally(&mut self, record: &CleanRecord, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Inserted(_) => self.inserted += 1,
            LoadOutcome::Updated(_) => self.updated += 1,
            LoadOutcome::Failed(reason) => {
                self.failed += 1;
                self.errors.push(LoadFailure {
                    row: record.row(),
                    key: record.business_key(),
                    reason,
                });
            }
        }
    }

    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated
    }

    /// Records with any outcome, stored or rejected.
    pub fn processed(&self) -> usize {
        self.succeeded() + self.failed
    }

    /// Fold in the outcomes of a committed batch. `total` is left alone.
    pub fn absorb(&mut self, other: BatchStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Loads cleaned tables through one held connection.
pub struct Loader<'a> {
    store: &'a mut Store,
    batch_size: usize,
}

impl<'a> Loader<'a> {
    /// A `batch_size` of zero is treated as one.
    pub fn new(store: &'a mut Store, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Upsert a single record in its own transaction.
    pub fn upsert(&mut self, record: &CleanRecord) -> LoadResult<LoadOutcome> {
        let tx = self
            .store
            .connection_mut()
            .transaction()
            .map_err(LoadError::Connection)?;
        let outcome = upsert_record(&tx, record)?;
        if outcome.is_failed() {
            tx.rollback().map_err(LoadError::Connection)?;
        } else {
            tx.commit().map_err(LoadError::Connection)?;
        }
        Ok(outcome)
    }

    /// Upsert every record of `table`, committing every `batch_size` records.
    pub fn load_batch(&mut self, table: &CleanTable) -> LoadResult<BatchStats> {
        info!(
            records = table.len(),
            batch_size = self.batch_size,
            record_type = %table.record_type,
            "Loading records"
        );
        let mut stats = BatchStats::new(table.len());
        let conn = self.store.connection_mut();

        for chunk in table.records.chunks(self.batch_size) {
            match load_chunk(conn, chunk) {
                Ok(committed) => {
                    stats.absorb(committed);
                    info!(processed = stats.processed(), "Committed batch");
                }
                Err(LoadError::Connection(source)) => {
                    let committed = stats.processed();
                    error!(committed, error = %source, "Load aborted");
                    return Err(LoadError::Aborted {
                        committed,
                        stats: Box::new(stats),
                        source,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            failed = stats.failed,
            "Load complete"
        );
        Ok(stats)
    }

    /// Insert every record without conflict resolution. All or nothing.
    pub fn bulk_insert(&mut self, table: &CleanTable) -> LoadResult<BatchStats> {
        bulk_insert(self.store.connection_mut(), table)
    }
}

/// One committed transaction over `chunk`. Dropping the transaction on error
/// rolls the whole chunk back, so its outcomes are only returned on commit.
fn load_chunk(conn: &mut Connection, chunk: &[CleanRecord]) -> LoadResult<BatchStats> {
    let mut stats = BatchStats::default();
    let mut tx = conn.transaction().map_err(LoadError::Connection)?;

    for record in chunk {
        let mut sp = tx.savepoint().map_err(LoadError::Connection)?;
        let outcome = upsert_record(&sp, record)?;
        if let LoadOutcome::Failed(reason) = &outcome {
            warn!(row = record.row(), key = %record.business_key(), %reason, "Record rejected");
            sp.rollback().map_err(LoadError::Connection)?;
        }
        sp.commit().map_err(LoadError::Connection)?;
        stats.tally(record, outcome);
    }

    tx.commit().map_err(LoadError::Connection)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CleanStudent, RecordType};

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.bootstrap().unwrap();
        store
    }

    fn students(n: usize) -> CleanTable {
        let records = (0..n)
            .map(|i| {
                CleanRecord::Student(CleanStudent {
                    row: i,
                    email: Some(format!("student{i}@uni.edu")),
                    student_code: Some(format!("STU{i:03}")),
                    department_code: Some("CS".into()),
                    ..Default::default()
                })
            })
            .collect();
        CleanTable {
            record_type: RecordType::Students,
            records,
        }
    }

    #[test]
    fn test_partial_failure_batch() {
        let mut store = store();
        let mut table = students(10);
        if let CleanRecord::Student(s) = &mut table.records[5] {
            s.department_code = Some("ART".into());
        }

        let stats = Loader::new(&mut store, 3).load_batch(&table).unwrap();

        assert_eq!(stats.total, 10);
        assert_eq!(stats.inserted, 9);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].row, 5);
        assert_eq!(stats.errors[0].key, "student5@uni.edu");
        assert_eq!(store.count(RecordType::Students).unwrap(), 9);
    }

    #[test]
    fn test_second_load_updates() {
        let mut store = store();
        let table = students(4);

        let first = Loader::new(&mut store, 100).load_batch(&table).unwrap();
        let second = Loader::new(&mut store, 100).load_batch(&table).unwrap();

        assert_eq!(first.inserted, 4);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 4);
        assert_eq!(store.count(RecordType::Students).unwrap(), 4);
    }

    #[test]
    fn test_failed_record_leaves_no_trace() {
        let mut store = store();
        let mut table = students(2);
        if let CleanRecord::Student(s) = &mut table.records[1] {
            s.gender = Some("robot".into());
        }

        let stats = Loader::new(&mut store, 1).load_batch(&table).unwrap();

        assert_eq!(stats.inserted, 1);
        assert!(matches!(stats.errors[0].reason, RecordError::Constraint(_)));
        assert_eq!(store.count(RecordType::Students).unwrap(), 1);
    }

    #[test]
    fn test_empty_table() {
        let mut store = store();
        let stats = Loader::new(&mut store, 10)
            .load_batch(&CleanTable::new(RecordType::Courses))
            .unwrap();
        assert_eq!(stats, BatchStats::new(0));
    }

    #[test]
    fn test_connection_loss_keeps_committed_counts() {
        let mut store = store();
        let conn = store.connection();
        let pages: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0)).unwrap();
        conn.pragma_update_and_check(None, "max_page_count", pages + 2, |r| r.get::<_, i64>(0))
            .unwrap();
        let table = students(400);

        let err = Loader::new(&mut store, 5).load_batch(&table).unwrap_err();

        let LoadError::Aborted { committed, stats, .. } = &err else {
            panic!("expected aborted load, got {err:?}");
        };
        let stored = store.count(RecordType::Students).unwrap() as usize;
        assert!(stored > 0 && stored < 400);
        assert_eq!(stored % 5, 0);
        assert_eq!(stats.inserted, stored);
        assert_eq!(*committed, stored);
        assert_eq!(stats.total, 400);
        assert_eq!(stats.failed, 0);
        assert_eq!(err.partial_stats(), Some(stats.as_ref()));
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        let mut store = store();
        assert_eq!(Loader::new(&mut store, 0).batch_size(), 1);
    }

    #[test]
    fn test_single_upsert() {
        let mut store = store();
        let table = students(1);
        let mut loader = Loader::new(&mut store, 10);

        assert!(matches!(loader.upsert(&table.records[0]).unwrap(), LoadOutcome::Inserted(_)));
        assert!(matches!(loader.upsert(&table.records[0]).unwrap(), LoadOutcome::Updated(_)));
    }
}
