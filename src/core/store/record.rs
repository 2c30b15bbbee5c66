//! Persisted record types.

use crate::core::tags::search_terms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One saved media item with its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Storage-assigned id; storage order is ascending id
    pub id: i64,
    /// Page the media was saved from
    pub source_url: String,
    pub tags: Vec<String>,
    /// Lowercase search terms derived from `tags`
    #[serde(default)]
    pub tag_text: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Direct URL of the media itself
    pub media_url: String,
    /// Serialized fingerprint, absent when hashing was skipped or failed
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub pool_index: Option<u32>,
}

impl ImageRecord {
    /// The `(pool_id, pool_index)` slot this record occupies, if pooled
    pub fn pool_slot(&self) -> Option<(&str, u32)> {
        match (&self.pool_id, self.pool_index) {
            (Some(pool_id), Some(index)) => Some((pool_id.as_str(), index)),
            _ => None,
        }
    }
}

/// A record that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub source_url: String,
    pub media_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub pool_id: Option<String>,
    /// Without a `pool_id` this is ignored; with one but no index, the
    /// record is appended to the pool
    #[serde(default)]
    pub pool_index: Option<u32>,
}

impl NewRecord {
    /// Create an unpooled record stamped with the current time
    pub fn new(
        source_url: impl Into<String>,
        media_url: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            media_url: media_url.into(),
            tags,
            timestamp: Utc::now(),
            fingerprint: None,
            pool_id: None,
            pool_index: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Place the record in a pool at `index`
    pub fn with_pool(mut self, pool_id: impl Into<String>, index: u32) -> Self {
        self.pool_id = Some(pool_id.into());
        self.pool_index = Some(index);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Materialize with a storage id, deriving the search terms
    pub fn into_record(self, id: i64) -> ImageRecord {
        ImageRecord {
            id,
            tag_text: search_terms(&self.tags),
            source_url: self.source_url,
            tags: self.tags,
            timestamp: self.timestamp,
            media_url: self.media_url,
            fingerprint: self.fingerprint,
            pool_id: self.pool_id,
            pool_index: self.pool_index,
        }
    }
}

impl From<ImageRecord> for NewRecord {
    fn from(record: ImageRecord) -> Self {
        Self {
            source_url: record.source_url,
            media_url: record.media_url,
            tags: record.tags,
            timestamp: record.timestamp,
            fingerprint: record.fingerprint,
            pool_id: record.pool_id,
            pool_index: record.pool_index,
        }
    }
}
