//! Bounded waits for work that may hang.
//!
//! The work runs on a helper thread and the caller waits on a crossbeam
//! channel. On expiry the caller moves on; a late result is dropped when
//! the helper finds the receiver gone.

use crossbeam_channel::{bounded, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Why bounded work produced no value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineError {
    /// The timeout elapsed first
    Elapsed,
    /// The helper thread could not start or panicked
    Abandoned,
}

/// Run `work` on a helper thread and wait at most `timeout` for it.
pub fn run_with_timeout<T, F>(name: &str, timeout: Duration, work: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = bounded(1);

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = sender.send(work());
        })
        .map_err(|_| DeadlineError::Abandoned)?;

    receiver.recv_timeout(timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => DeadlineError::Elapsed,
        RecvTimeoutError::Disconnected => DeadlineError::Abandoned,
    })
}
