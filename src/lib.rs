//! # TagSaver Core
//!
//! Duplicate-aware storage for tagged media saved from the web.
//!
//! ## What It Does
//! - **Fingerprints** images, animations and video frames with a perceptual hash
//! - **Refuses duplicates** by asking a remote index first and falling back
//!   to a scan of the local records
//! - **Keeps pools ordered** so no two records share a position
//!
//! ## Architecture
//! - `core` - Hashing, comparison, record store, pools and the save pipeline
//! - `config` - User settings loaded from JSON
//! - `events` - Progress and outcome reporting over channels
//! - `error` - Error types
//! - `cli` - Command-line interface (binary only)

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{Result, TagSaverError};

/// Initialize tracing for the library
///
/// Called by the application entry point. Filtering follows `RUST_LOG`.
/// A second call leaves the first subscriber in place.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
