//! In-memory record store.

use super::{ImageRecord, NewRecord, RecordStore, ScanVisitor, StoreTransaction, TransactionWork};
use crate::error::StoreError;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<i64, ImageRecord>,
    /// Occupied `(pool_id, pool_index)` slots and the record holding each
    slots: BTreeMap<(String, u32), i64>,
    last_id: i64,
}

impl MemoryState {
    fn check_slot(&self, record_id: i64, slot: Option<(&str, u32)>) -> Result<(), StoreError> {
        let Some((pool_id, pool_index)) = slot else {
            return Ok(());
        };
        match self.slots.get(&(pool_id.to_string(), pool_index)) {
            Some(&holder) if holder != record_id => Err(StoreError::SlotTaken {
                pool_id: pool_id.to_string(),
                pool_index,
            }),
            _ => Ok(()),
        }
    }

    /// Store `record` under its id, keeping the slot index in step.
    /// Returns the record it replaced.
    fn write(&mut self, record: ImageRecord) -> Option<ImageRecord> {
        let previous = self.remove(record.id);
        if let Some((pool_id, index)) = record.pool_slot() {
            self.slots.insert((pool_id.to_string(), index), record.id);
        }
        self.records.insert(record.id, record);
        previous
    }

    fn remove(&mut self, id: i64) -> Option<ImageRecord> {
        let previous = self.records.remove(&id)?;
        if let Some((pool_id, index)) = previous.pool_slot() {
            let key = (pool_id.to_string(), index);
            if self.slots.get(&key) == Some(&id) {
                self.slots.remove(&key);
            }
        }
        Some(previous)
    }
}

/// Undo step for one write made inside a transaction
enum Undo {
    Inserted(i64),
    Replaced(ImageRecord),
}

/// Writes straight into the locked state and remembers how to take them
/// back. Anything not committed is undone on drop, including when the unit
/// of work panics.
struct Journal<'a> {
    state: &'a mut MemoryState,
    undo: Vec<Undo>,
    last_id: i64,
    committed: bool,
}

impl<'a> Journal<'a> {
    fn new(state: &'a mut MemoryState) -> Self {
        let last_id = state.last_id;
        Self {
            state,
            undo: Vec::new(),
            last_id,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Journal<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Inserted(id) => {
                    self.state.remove(id);
                }
                Undo::Replaced(record) => {
                    self.state.write(record);
                }
            }
        }
        self.state.last_id = self.last_id;
    }
}

impl StoreTransaction for Journal<'_> {
    fn get_by_pool(&mut self, pool_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        let mut members: Vec<ImageRecord> = self
            .state
            .records
            .values()
            .filter(|r| r.pool_id.as_deref() == Some(pool_id))
            .cloned()
            .collect();
        members.sort_by_key(|r| (r.pool_index, r.id));
        Ok(members)
    }

    fn get_by_pool_and_index(
        &mut self,
        pool_id: &str,
        index: u32,
    ) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self
            .state
            .slots
            .get(&(pool_id.to_string(), index))
            .and_then(|id| self.state.records.get(id))
            .cloned())
    }

    fn put(&mut self, record: &ImageRecord) -> Result<(), StoreError> {
        if !self.state.records.contains_key(&record.id) {
            return Err(StoreError::NotFound { id: record.id });
        }
        self.state.check_slot(record.id, record.pool_slot())?;
        if let Some(previous) = self.state.write(record.clone()) {
            self.undo.push(Undo::Replaced(previous));
        }
        Ok(())
    }

    fn insert(&mut self, record: NewRecord) -> Result<ImageRecord, StoreError> {
        let id = self.state.last_id + 1;
        let record = record.into_record(id);
        self.state.check_slot(id, record.pool_slot())?;
        self.state.last_id = id;
        self.state.write(record.clone());
        self.undo.push(Undo::Inserted(id));
        Ok(record)
    }
}

/// Record store held in process memory.
///
/// Transactions write in place under the lock and keep an undo journal, so
/// a unit of work costs what it touches rather than a copy of the store.
/// A failed or panicking unit of work is rolled back before the lock is
/// released.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // The journal undoes partial work while unwinding, so a poisoned
        // lock still guards consistent data
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for InMemoryStore {
    fn scan(&self, visitor: &mut ScanVisitor<'_>) -> Result<(), StoreError> {
        let snapshot: Vec<ImageRecord> = self.lock().records.values().cloned().collect();
        for record in snapshot {
            if visitor(Ok(record)).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), StoreError> {
        let mut state = self.lock();
        let mut journal = Journal::new(&mut state);
        work(&mut journal)?;
        journal.commit();
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().records.len())
    }
}
