//! # Pool Module
//!
//! Keeps `pool_index` unique within each pool.
//!
//! A pool is never stored as such: it is the set of records sharing a
//! `pool_id`, ordered by `pool_index`. Inserting at an occupied index makes
//! room by moving every record at or above it up by one.
//!
//! ## Shift order
//! Records are moved highest index first. Each single move then lands on a
//! free slot, so the store's uniqueness check holds after every write, not
//! only at commit.

use crate::core::store::{transact, ImageRecord, NewRecord, RecordStore, StoreTransaction};
use crate::error::StoreError;
use crate::events::{null_sender, Event, EventSender, PoolEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of reserving a pool slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAssignment {
    pub pool_id: String,
    pub index: u32,
    /// How many existing records moved up to free the slot
    pub shifted: usize,
}

/// Assigns and repairs pool indices over a record store
pub struct PoolSequencer {
    store: Arc<dyn RecordStore>,
    events: EventSender,
}

impl PoolSequencer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            events: null_sender(),
        }
    }

    /// Report shifts and assignments on `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Make `requested_index` free in `pool_id`.
    ///
    /// When the slot is occupied, every record at or above it moves up by
    /// one. Check and shift form one transaction. The caller persists the
    /// new record at `requested_index` afterwards; [`Self::insert_at`] does
    /// both in one step.
    pub fn assign_index(
        &self,
        pool_id: &str,
        requested_index: u32,
    ) -> Result<PoolAssignment, StoreError> {
        let shifted = transact(self.store.as_ref(), |tx| {
            make_room(tx, pool_id, requested_index)
        })?;
        let assignment = PoolAssignment {
            pool_id: pool_id.to_string(),
            index: requested_index,
            shifted,
        };
        self.report(&assignment);
        Ok(assignment)
    }

    /// Store a pooled record, shifting others as needed, in one transaction.
    ///
    /// A record without `pool_index` is appended after the current highest.
    /// A record without `pool_id` is stored as is.
    pub fn insert_at(&self, record: NewRecord) -> Result<ImageRecord, StoreError> {
        let (stored, shifted) = transact(self.store.as_ref(), |tx| insert_pooled(tx, record))?;
        if let Some((pool_id, index)) = stored.pool_slot() {
            self.report(&PoolAssignment {
                pool_id: pool_id.to_string(),
                index,
                shifted,
            });
        }
        Ok(stored)
    }

    /// Highest index in use, `None` for an empty pool
    pub fn get_highest_index(&self, pool_id: &str) -> Result<Option<u32>, StoreError> {
        let members = self.store.get_by_pool(pool_id)?;
        Ok(highest_index(&members))
    }

    /// Index a new record appended to the pool would take
    pub fn next_index(&self, pool_id: &str) -> Result<u32, StoreError> {
        Ok(match self.get_highest_index(pool_id)? {
            Some(highest) => highest.saturating_add(1),
            None => 0,
        })
    }

    /// Records of the pool in ascending index order
    pub fn pool_members(&self, pool_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        self.store.get_by_pool(pool_id)
    }

    fn report(&self, assignment: &PoolAssignment) {
        if assignment.shifted > 0 {
            self.events.send(Event::Pool(PoolEvent::Shifted {
                pool_id: assignment.pool_id.clone(),
                from_index: assignment.index,
                count: assignment.shifted,
            }));
        }
        self.events.send(Event::Pool(PoolEvent::Assigned {
            pool_id: assignment.pool_id.clone(),
            index: assignment.index,
        }));
    }
}

fn highest_index(members: &[ImageRecord]) -> Option<u32> {
    members.iter().filter_map(|r| r.pool_index).max()
}

/// Free `requested` in `pool_id` within an open transaction.
///
/// Returns the number of records moved.
pub(crate) fn make_room(
    tx: &mut dyn StoreTransaction,
    pool_id: &str,
    requested: u32,
) -> Result<usize, StoreError> {
    if tx.get_by_pool_and_index(pool_id, requested)?.is_none() {
        return Ok(0);
    }

    let mut to_shift: Vec<ImageRecord> = tx
        .get_by_pool(pool_id)?
        .into_iter()
        .filter(|r| r.pool_index.is_some_and(|index| index >= requested))
        .collect();
    to_shift.sort_by(|a, b| b.pool_index.cmp(&a.pool_index));

    for record in &mut to_shift {
        let current = record.pool_index.unwrap_or(requested);
        let moved = current.checked_add(1).ok_or_else(|| StoreError::SlotTaken {
            pool_id: pool_id.to_string(),
            pool_index: current,
        })?;
        record.pool_index = Some(moved);
        tx.put(record)?;
    }

    info!(
        pool_id,
        from_index = requested,
        count = to_shift.len(),
        "shifted pool records to make room"
    );
    Ok(to_shift.len())
}

/// Insert `record` within an open transaction, making room first.
///
/// Returns the stored record and how many others moved.
pub(crate) fn insert_pooled(
    tx: &mut dyn StoreTransaction,
    mut record: NewRecord,
) -> Result<(ImageRecord, usize), StoreError> {
    let Some(pool_id) = record.pool_id.clone() else {
        record.pool_index = None;
        return Ok((tx.insert(record)?, 0));
    };

    let index = match record.pool_index {
        Some(index) => index,
        None => {
            let members = tx.get_by_pool(&pool_id)?;
            highest_index(&members).map_or(0, |highest| highest.saturating_add(1))
        }
    };

    let shifted = make_room(tx, &pool_id, index)?;
    record.pool_index = Some(index);
    let stored = tx.insert(record)?;

    debug!(pool_id = %pool_id, index, record_id = stored.id, "inserted pooled record");
    Ok((stored, shifted))
}
