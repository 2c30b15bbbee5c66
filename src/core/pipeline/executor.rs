//! Save pipeline implementation.

use crate::config::Settings;
use crate::core::cache::FingerprintCache;
use crate::core::comparator::{ComparisonStrategy, ThresholdStrategy};
use crate::core::hasher::{Fingerprint, HashEngine, HasherConfig, MediaRef};
use crate::core::pool::{PoolAssignment, PoolSequencer};
use crate::core::resolver::{DuplicateResolver, RemoteDuplicateIndex, SimilarityVerdict};
use crate::core::store::{ImageRecord, NewRecord, RecordStore};
use crate::core::tags;
use crate::error::{FingerprintError, StoreError, TagSaverError};
use crate::events::{null_sender, Event, EventSender, FingerprintEvent, SaveEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Where in a pool the saved record goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPlacement {
    pub pool_id: String,
    /// `None` appends after the current highest index
    pub index: Option<u32>,
}

/// Everything needed to save one media item
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// Page the media was found on
    pub source_url: String,
    pub media: MediaRef,
    pub tags: Vec<String>,
    pub pool: Option<PoolPlacement>,
}

impl SaveRequest {
    pub fn new(source_url: impl Into<String>, media: MediaRef, tags: Vec<String>) -> Self {
        Self {
            source_url: source_url.into(),
            media,
            tags,
            pool: None,
        }
    }

    /// Save into `pool_id` at `index`, or at the end when `None`
    pub fn in_pool(mut self, pool_id: impl Into<String>, index: Option<u32>) -> Self {
        self.pool = Some(PoolPlacement {
            pool_id: pool_id.into(),
            index,
        });
        self
    }
}

/// What a save did
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The record was stored
    Saved {
        record: ImageRecord,
        /// Why the record has no fingerprint, if it has none
        fingerprint_skipped: Option<String>,
    },
    /// Nothing was stored; the media matches an existing record
    Duplicate(SimilarityVerdict),
}

impl SaveOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SaveOutcome::Duplicate(_))
    }

    pub fn record(&self) -> Option<&ImageRecord> {
        match self {
            SaveOutcome::Saved { record, .. } => Some(record),
            SaveOutcome::Duplicate(_) => None,
        }
    }
}

/// Builder for the save pipeline
pub struct SavePipelineBuilder {
    store: Arc<dyn RecordStore>,
    hasher: HasherConfig,
    cache: Option<Arc<FingerprintCache>>,
    remote: Option<Arc<dyn RemoteDuplicateIndex>>,
    probe_timeout: Duration,
    strategy: ThresholdStrategy,
    duplicate_detection: bool,
    events: EventSender,
}

impl SavePipelineBuilder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            hasher: HasherConfig::new(),
            cache: None,
            remote: None,
            probe_timeout: Duration::from_secs(2),
            strategy: ThresholdStrategy::default(),
            duplicate_detection: true,
            events: null_sender(),
        }
    }

    /// Take hashing, threshold, detection and remote timeout from settings
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.hasher = settings.hasher_config();
        self.strategy = settings.threshold_strategy();
        self.duplicate_detection = settings.duplicate_detection;
        self.probe_timeout = settings.remote_probe_timeout();
        self
    }

    pub fn hasher(mut self, config: HasherConfig) -> Self {
        self.hasher = config;
        self
    }

    /// Share a fingerprint cache with other engines
    pub fn cache(mut self, cache: Arc<FingerprintCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteDuplicateIndex>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the comparison threshold (inclusive)
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.strategy = ThresholdStrategy::new(threshold);
        self
    }

    pub fn duplicate_detection(mut self, enabled: bool) -> Self {
        self.duplicate_detection = enabled;
        self
    }

    pub fn events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> SavePipeline {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(FingerprintCache::new()));
        let engine = self.hasher.build_with_cache(cache);

        let mut resolver = DuplicateResolver::new(Arc::clone(&self.store))
            .with_probe_timeout(self.probe_timeout)
            .with_events(self.events.clone());
        if let Some(remote) = self.remote {
            resolver = resolver.with_remote(remote);
        }

        let sequencer =
            PoolSequencer::new(Arc::clone(&self.store)).with_events(self.events.clone());

        SavePipeline {
            engine,
            resolver,
            sequencer,
            store: self.store,
            strategy: self.strategy,
            duplicate_detection: self.duplicate_detection,
            events: self.events,
        }
    }
}

/// Fingerprint, dedup and pool placement for saves into one store
pub struct SavePipeline {
    engine: HashEngine,
    resolver: DuplicateResolver,
    sequencer: PoolSequencer,
    store: Arc<dyn RecordStore>,
    strategy: ThresholdStrategy,
    duplicate_detection: bool,
    events: EventSender,
}

impl SavePipeline {
    /// Create a new pipeline builder over `store`
    pub fn builder(store: Arc<dyn RecordStore>) -> SavePipelineBuilder {
        SavePipelineBuilder::new(store)
    }

    /// Fingerprint a media item, reporting the outcome
    pub fn compute_fingerprint(&self, media: &MediaRef) -> Result<Fingerprint, FingerprintError> {
        let result = self.engine.compute_fingerprint(media);
        let event = match &result {
            Ok(fingerprint) => FingerprintEvent::Computed {
                source_url: media.source_url().to_string(),
                fingerprint: fingerprint.to_string(),
            },
            Err(e) => FingerprintEvent::Unavailable {
                source_url: media.source_url().to_string(),
                reason: e.to_string(),
            },
        };
        self.events.send(Event::Fingerprint(event));
        result
    }

    /// Duplicate check at the configured threshold
    pub fn check_duplicate(
        &self,
        fingerprint: Option<&Fingerprint>,
    ) -> Result<SimilarityVerdict, StoreError> {
        self.resolver.check(fingerprint, self.strategy.threshold())
    }

    /// Duplicate check at an explicit threshold
    pub fn check_duplicate_with(
        &self,
        fingerprint: Option<&Fingerprint>,
        threshold: u32,
    ) -> Result<SimilarityVerdict, StoreError> {
        self.resolver.check(fingerprint, threshold)
    }

    pub fn assign_pool_index(
        &self,
        pool_id: &str,
        requested_index: u32,
    ) -> Result<PoolAssignment, StoreError> {
        self.sequencer.assign_index(pool_id, requested_index)
    }

    pub fn get_highest_pool_index(&self, pool_id: &str) -> Result<Option<u32>, StoreError> {
        self.sequencer.get_highest_index(pool_id)
    }

    /// Index suggested for the next item of a pool
    pub fn next_pool_index(&self, pool_id: &str) -> Result<u32, StoreError> {
        self.sequencer.next_index(pool_id)
    }

    pub fn pool_members(&self, pool_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        self.sequencer.pool_members(pool_id)
    }

    /// Tag suggestions containing `query`
    pub fn search_tags(&self, query: &str) -> Result<Vec<String>, StoreError> {
        tags::search_tags(self.store.as_ref(), query)
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn engine(&self) -> &HashEngine {
        &self.engine
    }

    /// Save one media item.
    ///
    /// An unavailable fingerprint never blocks the save; the record is
    /// stored without one. A duplicate (with detection on) stores nothing.
    /// Only store failures are errors.
    pub fn save(&self, request: SaveRequest) -> Result<SaveOutcome, TagSaverError> {
        let (fingerprint, fingerprint_skipped) = match self.compute_fingerprint(&request.media) {
            Ok(fingerprint) => (Some(fingerprint), None),
            Err(e) => (None, Some(e.to_string())),
        };

        if self.duplicate_detection {
            let verdict = self.check_duplicate(fingerprint.as_ref())?;
            if verdict.is_duplicate {
                info!(
                    source_url = %request.source_url,
                    matched = ?verdict.matched_record.as_ref().map(|r| r.id),
                    "not saving duplicate media"
                );
                self.events.send(Event::Save(SaveEvent::SkippedDuplicate {
                    source_url: request.source_url,
                    matched_record_id: verdict.matched_record.as_ref().map(|r| r.id),
                }));
                return Ok(SaveOutcome::Duplicate(verdict));
            }
        }

        let mut record = NewRecord::new(
            request.source_url,
            request.media.source_url().to_string(),
            request.tags,
        );
        record.fingerprint = fingerprint.map(|f| f.to_string());
        if let Some(placement) = request.pool {
            record.pool_id = Some(placement.pool_id);
            record.pool_index = placement.index;
        }

        // Routes through the sequencer even when unpooled so the insert
        // shares the same transaction path
        let record = self.sequencer.insert_at(record)?;

        info!(record_id = record.id, source_url = %record.source_url, "saved record");
        self.events.send(Event::Save(SaveEvent::Saved {
            record_id: record.id,
            source_url: record.source_url.clone(),
        }));

        Ok(SaveOutcome::Saved {
            record,
            fingerprint_skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryStore;
    use crate::events::{DuplicateEvent, EventChannel};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::io::Cursor;

    /// Gray gradient; odd seeds mirror it left to right
    fn png(seed: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(128, 128, |x, y| {
            let x = if seed % 2 == 0 { x } else { 127 - x };
            let v = (x * 200 / 128 + y * 40 / 128) as u8;
            Rgb([v, v, v])
        }));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn request(page: &str, media_url: &str, bytes: Vec<u8>) -> SaveRequest {
        SaveRequest::new(page, MediaRef::bytes(media_url, bytes), vec!["tag".to_string()])
    }

    fn pipeline() -> SavePipeline {
        SavePipeline::builder(Arc::new(InMemoryStore::new())).build()
    }

    #[test]
    fn saves_new_media_with_fingerprint() {
        let pipeline = pipeline();

        let outcome = pipeline
            .save(request("https://site/1", "https://cdn/1.png", png(0)))
            .unwrap();

        let record = outcome.record().unwrap();
        assert!(record.fingerprint.as_deref().unwrap().starts_with("dct8:"));
        assert_eq!(record.media_url, "https://cdn/1.png");
    }

    #[test]
    fn same_media_twice_is_refused() {
        let pipeline = pipeline();
        pipeline
            .save(request("https://site/1", "https://cdn/1.png", png(0)))
            .unwrap();

        let outcome = pipeline
            .save(request("https://site/2", "https://cdn/copy.png", png(0)))
            .unwrap();

        match outcome {
            SaveOutcome::Duplicate(verdict) => assert!(verdict.exact_match),
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(pipeline.store().count().unwrap(), 1);
    }

    #[test]
    fn detection_off_saves_duplicates() {
        let pipeline = SavePipeline::builder(Arc::new(InMemoryStore::new()))
            .duplicate_detection(false)
            .build();

        pipeline.save(request("a", "https://cdn/1.png", png(0))).unwrap();
        pipeline.save(request("b", "https://cdn/2.png", png(0))).unwrap();

        assert_eq!(pipeline.store().count().unwrap(), 2);
    }

    #[test]
    fn undecodable_media_is_saved_without_fingerprint() {
        let pipeline = pipeline();

        let outcome = pipeline
            .save(request("a", "https://cdn/broken.png", b"garbage".to_vec()))
            .unwrap();

        match outcome {
            SaveOutcome::Saved {
                record,
                fingerprint_skipped,
            } => {
                assert!(record.fingerprint.is_none());
                assert!(fingerprint_skipped.is_some());
            }
            other => panic!("expected save, got {other:?}"),
        }
    }

    #[test]
    fn pooled_saves_keep_indices_unique() {
        let pipeline = pipeline();
        pipeline
            .save(request("a", "https://cdn/a.png", png(0)).in_pool("p", Some(0)))
            .unwrap();
        pipeline
            .save(request("b", "https://cdn/b.png", png(1)).in_pool("p", Some(0)))
            .unwrap();

        let order: Vec<(String, Option<u32>)> = pipeline
            .pool_members("p")
            .unwrap()
            .into_iter()
            .map(|r| (r.source_url, r.pool_index))
            .collect();
        assert_eq!(order, vec![("b".to_string(), Some(0)), ("a".to_string(), Some(1))]);
        assert_eq!(pipeline.get_highest_pool_index("p").unwrap(), Some(1));
        assert_eq!(pipeline.next_pool_index("p").unwrap(), 2);
    }

    #[test]
    fn events_describe_the_save() {
        let (sender, receiver) = EventChannel::new();
        let pipeline = SavePipeline::builder(Arc::new(InMemoryStore::new()))
            .events(sender)
            .build();

        pipeline.save(request("a", "https://cdn/a.png", png(0))).unwrap();

        let events: Vec<Event> = receiver.try_iter().collect();
        assert!(matches!(
            events.first(),
            Some(Event::Fingerprint(FingerprintEvent::Computed { .. }))
        ));
        assert!(events.contains(&Event::Duplicate(DuplicateEvent::Unique)));
        assert!(matches!(
            events.last(),
            Some(Event::Save(SaveEvent::Saved { .. }))
        ));
    }
}
