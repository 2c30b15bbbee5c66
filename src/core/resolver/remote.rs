//! Optional remote duplicate index.
//!
//! Only the seam lives here. A host that keeps a server-side index of saved
//! media implements [`RemoteDuplicateIndex`] over its own transport.

use crate::core::deadline::{run_with_timeout, DeadlineError};
use crate::core::hasher::Fingerprint;
use crate::core::store::ImageRecord;
use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Answer of a remote lookup. Remote indexes match exact fingerprints only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteVerdict {
    pub exists: bool,
    #[serde(default)]
    pub record: Option<ImageRecord>,
}

/// A remote service that knows which fingerprints were already saved
pub trait RemoteDuplicateIndex: Send + Sync {
    /// Cheap reachability check
    fn probe(&self) -> Result<(), RemoteError>;

    /// Whether `fingerprint` is already saved remotely
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<RemoteVerdict, RemoteError>;
}

/// Probe then look up, each call bounded by `timeout`
pub(crate) fn bounded_lookup(
    remote: &Arc<dyn RemoteDuplicateIndex>,
    fingerprint: &Fingerprint,
    timeout: Duration,
) -> Result<RemoteVerdict, RemoteError> {
    let probe = Arc::clone(remote);
    bounded(timeout, "tagsaver-remote-probe", move || probe.probe())?;

    let lookup = Arc::clone(remote);
    let fingerprint = fingerprint.clone();
    bounded(timeout, "tagsaver-remote-lookup", move || {
        lookup.lookup(&fingerprint)
    })
}

fn bounded<T, F>(timeout: Duration, name: &str, call: F) -> Result<T, RemoteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
{
    match run_with_timeout(name, timeout, call) {
        Ok(result) => result,
        Err(DeadlineError::Elapsed) => Err(RemoteError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(DeadlineError::Abandoned) => Err(RemoteError::Unreachable(
            "remote call stopped before answering".to_string(),
        )),
    }
}
