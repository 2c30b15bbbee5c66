//! Event type definitions.

use serde::{Deserialize, Serialize};

/// All events emitted while saving media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Fingerprinting events
    Fingerprint(FingerprintEvent),
    /// Duplicate lookup events
    Duplicate(DuplicateEvent),
    /// Pool ordering events
    Pool(PoolEvent),
    /// Save outcome events
    Save(SaveEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FingerprintEvent {
    /// A fingerprint was computed
    Computed {
        source_url: String,
        fingerprint: String,
    },
    /// Hashing failed or timed out; duplicate detection is skipped
    Unavailable { source_url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DuplicateEvent {
    /// The remote index could not answer, the local scan was used
    RemoteFallback { reason: String },
    /// A stored record matches
    Found {
        record_id: Option<i64>,
        exact: bool,
    },
    /// Nothing within the threshold
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolEvent {
    /// Records at and above `from_index` moved up by one
    Shifted {
        pool_id: String,
        from_index: u32,
        count: usize,
    },
    /// A slot was reserved for a new record
    Assigned { pool_id: String, index: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaveEvent {
    /// The record was persisted
    Saved { record_id: i64, source_url: String },
    /// The save was refused because the media is already stored
    SkippedDuplicate {
        source_url: String,
        matched_record_id: Option<i64>,
    },
}
