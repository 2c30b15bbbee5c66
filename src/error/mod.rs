//! # Error Module
//!
//! Error types for the tag saver core.
//!
//! ## Design Principles
//! - **Never block a save** - fingerprint and remote failures degrade to
//!   "dedup skipped" or "local fallback"
//! - **Include context** - paths, URLs, pool ids, what went wrong
//! - **Only the store surfaces** - persistence failures reach the caller,
//!   everything else is recoverable

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error
#[derive(Error, Debug)]
pub enum TagSaverError {
    #[error("Fingerprint unavailable: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Remote duplicate index unavailable: {0}")]
    Remote(#[from] RemoteError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Comparison error: {0}")]
    Compare(#[from] CompareError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a fingerprint could not be computed.
///
/// Every variant means the same thing to callers: skip duplicate detection
/// for this save. None of them means "unique".
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Unsupported media format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to decode {source_url}: {reason}")]
    Decode { source_url: String, reason: String },

    #[error("Failed to extract a frame at {offset_ms}ms from {source_url}: {reason}")]
    FrameExtraction {
        source_url: String,
        offset_ms: u64,
        reason: String,
    },

    #[error("Media is empty or has zero dimensions: {source_url}")]
    EmptyMedia { source_url: String },

    #[error("Fingerprinting {source_url} timed out after {timeout_ms}ms")]
    Timeout { source_url: String, timeout_ms: u64 },

    #[error("Failed to read media file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fingerprint text {text:?}: {reason}")]
    Malformed { text: String, reason: String },
}

impl FingerprintError {
    /// Fill in the media URL on errors raised below the engine, where it
    /// is not known.
    pub(crate) fn with_source(self, url: &str) -> Self {
        let fill = |source_url: String| {
            if source_url.is_empty() {
                url.to_string()
            } else {
                source_url
            }
        };
        match self {
            FingerprintError::Decode { source_url, reason } => FingerprintError::Decode {
                source_url: fill(source_url),
                reason,
            },
            FingerprintError::EmptyMedia { source_url } => FingerprintError::EmptyMedia {
                source_url: fill(source_url),
            },
            other => other,
        }
    }
}

/// Failures of the optional remote duplicate index.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote probe did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Remote service unreachable: {0}")]
    Unreachable(String),

    #[error("Remote service returned an unusable response: {0}")]
    Protocol(String),
}

/// Persistence failures. These are surfaced to the caller and never retried.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open record database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record store corruption detected at {path}. Export what you can and recreate it.")]
    Corrupted { path: PathBuf },

    #[error("Failed to (de)serialize record data: {0}")]
    Serialization(String),

    #[error("Record {id} not found")]
    NotFound { id: i64 },

    #[error("Pool {pool_id} already has a record at index {pool_index}")]
    SlotTaken { pool_id: String, pool_index: u32 },
}

/// Failures while comparing fingerprints
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    #[error("Fingerprints are incomparable: {left} ({left_bits} bits) vs {right} ({right_bits} bits)")]
    Incomparable {
        left: String,
        left_bits: u32,
        right: String,
        right_bits: u32,
    },
}

/// Failures while loading or validating settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file {path} is not valid JSON: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid threshold: {value} (must be 0-{max})")]
    InvalidThreshold { value: u32, max: u32 },

    #[error("Invalid hash geometry: {0}")]
    InvalidHashGeometry(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, TagSaverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_includes_url() {
        let error = FingerprintError::Decode {
            source_url: "https://example.org/a.png".to_string(),
            reason: "bad header".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("https://example.org/a.png"));
        assert!(message.contains("bad header"));
    }

    #[test]
    fn timeout_error_includes_budget() {
        let error = FingerprintError::Timeout {
            source_url: "clip.webm".to_string(),
            timeout_ms: 2500,
        };
        assert!(error.to_string().contains("2500ms"));
    }

    #[test]
    fn with_source_fills_missing_url() {
        let error = FingerprintError::EmptyMedia {
            source_url: String::new(),
        }
        .with_source("https://example.org/b.gif");
        assert!(error.to_string().contains("https://example.org/b.gif"));
    }

    #[test]
    fn store_errors_convert_into_top_level() {
        let error: TagSaverError = StoreError::QueryFailed("locked".to_string()).into();
        assert!(matches!(error, TagSaverError::Store(_)));
        assert!(error.to_string().contains("locked"));
    }

    #[test]
    fn corruption_suggests_recovery() {
        let error = StoreError::Corrupted {
            path: PathBuf::from("/data/records.db"),
        };
        assert!(error.to_string().contains("Export what you can"));
    }
}
