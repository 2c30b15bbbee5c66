//! # Store Module
//!
//! The persisted collection of saved records.
//!
//! ## Backends
//! - **SQLite** - Durable, WAL mode, one write transaction per unit of work
//! - **In-memory** - For tests and short-lived sessions
//!
//! ## Invariants
//! - Storage order is ascending record id (insertion order)
//! - No two records share a `(pool_id, pool_index)` slot. Backends reject a
//!   write that would break this with [`StoreError::SlotTaken`]; making room
//!   is the pool sequencer's job.
//!
//! Multi-step updates go through [`RecordStore::transaction`] (or the
//! [`transact`] helper), which commits all of the work or none of it and
//! excludes other transactions on the same store while it runs.

mod memory;
mod record;
mod sqlite;
mod transfer;

pub use memory::InMemoryStore;
pub use record::{ImageRecord, NewRecord};
pub use sqlite::SqliteStore;
pub use transfer::{export_json, import_json};

use crate::error::StoreError;
use std::ops::ControlFlow;

/// Visitor passed to [`RecordStore::scan`]
pub type ScanVisitor<'a> = dyn FnMut(Result<ImageRecord, StoreError>) -> ControlFlow<()> + 'a;

/// Unit of work passed to [`RecordStore::transaction`]
pub type TransactionWork<'a> =
    dyn FnMut(&mut dyn StoreTransaction) -> Result<(), StoreError> + 'a;

/// Reads and writes available inside a transaction
pub trait StoreTransaction {
    /// Records of a pool, ascending by index
    fn get_by_pool(&mut self, pool_id: &str) -> Result<Vec<ImageRecord>, StoreError>;

    fn get_by_pool_and_index(
        &mut self,
        pool_id: &str,
        index: u32,
    ) -> Result<Option<ImageRecord>, StoreError>;

    /// Overwrite an existing record, matched by id
    fn put(&mut self, record: &ImageRecord) -> Result<(), StoreError>;

    /// Store a new record and return it with its id
    fn insert(&mut self, record: NewRecord) -> Result<ImageRecord, StoreError>;
}

/// Persistence backend for records
pub trait RecordStore: Send + Sync {
    /// Visit every record in storage order.
    ///
    /// Each record arrives as its own `Result`, so one unreadable row does
    /// not end the scan. The visitor stops early with `ControlFlow::Break`.
    fn scan(&self, visitor: &mut ScanVisitor<'_>) -> Result<(), StoreError>;

    /// Run `work` atomically. An `Err` from `work` rolls everything back and
    /// is returned unchanged.
    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), StoreError>;

    /// Every readable record in storage order. Unreadable ones are skipped.
    fn scan_all(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let mut records = Vec::new();
        self.scan(&mut |record| {
            if let Ok(record) = record {
                records.push(record);
            }
            ControlFlow::Continue(())
        })?;
        Ok(records)
    }

    fn get_by_pool(&self, pool_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        transact(self, |tx| tx.get_by_pool(pool_id))
    }

    fn get_by_pool_and_index(
        &self,
        pool_id: &str,
        index: u32,
    ) -> Result<Option<ImageRecord>, StoreError> {
        transact(self, |tx| tx.get_by_pool_and_index(pool_id, index))
    }

    fn put(&self, record: &ImageRecord) -> Result<(), StoreError> {
        transact(self, |tx| tx.put(record))
    }

    fn insert(&self, record: NewRecord) -> Result<ImageRecord, StoreError> {
        transact(self, |tx| tx.insert(record))
    }

    /// Number of stored records
    fn count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        self.scan(&mut |_| {
            count += 1;
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }
}

/// Run a value-returning unit of work in one transaction
pub fn transact<S, T, F>(store: &S, work: F) -> Result<T, StoreError>
where
    S: RecordStore + ?Sized,
    F: FnOnce(&mut dyn StoreTransaction) -> Result<T, StoreError>,
{
    let mut work = Some(work);
    let mut output = None;

    store.transaction(&mut |tx: &mut dyn StoreTransaction| {
        let work = work
            .take()
            .ok_or_else(|| StoreError::QueryFailed("transaction body ran twice".to_string()))?;
        output = Some(work(tx)?);
        Ok(())
    })?;

    output.ok_or_else(|| StoreError::QueryFailed("transaction did not run".to_string()))
}
