//! # Pipeline Module
//!
//! Orchestrates saving one media item.
//!
//! ## Save Stages
//! 1. **Fingerprint** - Hash the media (bounded; failure skips dedup)
//! 2. **Check** - Look for a stored duplicate when detection is enabled
//! 3. **Place** - Free the requested pool slot, shifting later records
//! 4. **Insert** - Persist the record; stages 3 and 4 share a transaction
//!
//! A duplicate stops the save before anything is written.

mod executor;

pub use executor::{PoolPlacement, SaveOutcome, SavePipeline, SavePipelineBuilder, SaveRequest};
