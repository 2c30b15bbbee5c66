//! # Resolver Module
//!
//! Decides whether a fingerprint is already saved.
//!
//! ## Lookup order
//! 1. No fingerprint: not a duplicate (detection skipped, never guessed)
//! 2. Remote index, when configured and answering within the probe timeout.
//!    Its verdict is returned as is.
//! 3. Local linear scan in storage order. Per record: identical bits are an
//!    exact match (a tagged query equals a legacy untagged record of the
//!    same width and hex), otherwise a Hamming distance within the
//!    threshold is a near match. The first match wins.
//!
//! Records whose stored fingerprint is unreadable, malformed or from another
//! scheme are skipped. The resolver never writes.

mod remote;

pub use remote::{RemoteDuplicateIndex, RemoteVerdict};

use crate::core::comparator::{ComparisonStrategy, ThresholdStrategy};
use crate::core::hasher::Fingerprint;
use crate::core::store::{ImageRecord, RecordStore};
use crate::error::StoreError;
use crate::events::{null_sender, DuplicateEvent, Event, EventSender};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a duplicate lookup
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimilarityVerdict {
    pub is_duplicate: bool,
    /// The stored fingerprint has exactly the query's bits
    pub exact_match: bool,
    pub matched_record: Option<ImageRecord>,
    /// Bit distance of a local near match
    pub distance: Option<u32>,
}

impl SimilarityVerdict {
    /// Not a duplicate
    pub fn unique() -> Self {
        Self::default()
    }

    fn exact(record: ImageRecord) -> Self {
        Self {
            is_duplicate: true,
            exact_match: true,
            matched_record: Some(record),
            distance: Some(0),
        }
    }

    fn near(record: ImageRecord, distance: u32) -> Self {
        Self {
            is_duplicate: true,
            exact_match: false,
            matched_record: Some(record),
            distance: Some(distance),
        }
    }
}

impl From<RemoteVerdict> for SimilarityVerdict {
    fn from(remote: RemoteVerdict) -> Self {
        Self {
            is_duplicate: remote.exists,
            exact_match: remote.exists,
            matched_record: remote.record,
            distance: None,
        }
    }
}

/// Duplicate lookup over a record store, with an optional remote index
pub struct DuplicateResolver {
    store: Arc<dyn RecordStore>,
    remote: Option<Arc<dyn RemoteDuplicateIndex>>,
    probe_timeout: Duration,
    events: EventSender,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            remote: None,
            probe_timeout: Duration::from_secs(2),
            events: null_sender(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteDuplicateIndex>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Budget for each remote call
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Look for a stored record matching `fingerprint` within `threshold`
    /// bits. Only a failing local store is an error.
    pub fn check(
        &self,
        fingerprint: Option<&Fingerprint>,
        threshold: u32,
    ) -> Result<SimilarityVerdict, StoreError> {
        let Some(fingerprint) = fingerprint else {
            debug!("no fingerprint, duplicate check skipped");
            return Ok(SimilarityVerdict::unique());
        };

        if let Some(remote) = &self.remote {
            match remote::bounded_lookup(remote, fingerprint, self.probe_timeout) {
                Ok(verdict) => {
                    debug!(exists = verdict.exists, "remote duplicate index answered");
                    let verdict = SimilarityVerdict::from(verdict);
                    self.report(&verdict);
                    return Ok(verdict);
                }
                Err(e) => {
                    warn!(error = %e, "remote duplicate index unavailable, scanning locally");
                    self.events.send(Event::Duplicate(DuplicateEvent::RemoteFallback {
                        reason: e.to_string(),
                    }));
                }
            }
        }

        let verdict = self.scan_local(fingerprint, threshold)?;
        self.report(&verdict);
        Ok(verdict)
    }

    /// First stored record within `threshold`, in storage order
    pub fn scan_local(
        &self,
        fingerprint: &Fingerprint,
        threshold: u32,
    ) -> Result<SimilarityVerdict, StoreError> {
        let query = fingerprint.to_string();
        let strategy = ThresholdStrategy::new(threshold);
        let mut verdict = SimilarityVerdict::unique();

        self.store.scan(&mut |record| {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable record");
                    return ControlFlow::Continue(());
                }
            };
            let Some(stored) = record.fingerprint.as_deref() else {
                return ControlFlow::Continue(());
            };

            if stored == query {
                verdict = SimilarityVerdict::exact(record);
                return ControlFlow::Break(());
            }

            let candidate = match Fingerprint::parse(stored) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(record_id = record.id, error = %e, "skipping malformed fingerprint");
                    return ControlFlow::Continue(());
                }
            };

            if !fingerprint.is_comparable_with(&candidate) {
                debug!(record_id = record.id, stored, "skipping incomparable fingerprint");
                return ControlFlow::Continue(());
            }
            if candidate.hex() == fingerprint.hex() {
                verdict = SimilarityVerdict::exact(record);
                return ControlFlow::Break(());
            }

            match strategy.evaluate(fingerprint, &candidate) {
                Some(result) => {
                    verdict = SimilarityVerdict::near(record, result.distance);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        })?;

        Ok(verdict)
    }

    fn report(&self, verdict: &SimilarityVerdict) {
        if verdict.is_duplicate {
            let record_id = verdict.matched_record.as_ref().map(|r| r.id);
            info!(record_id, exact = verdict.exact_match, distance = verdict.distance, "duplicate found");
            self.events.send(Event::Duplicate(DuplicateEvent::Found {
                record_id,
                exact: verdict.exact_match,
            }));
        } else {
            self.events.send(Event::Duplicate(DuplicateEvent::Unique));
        }
    }
}
