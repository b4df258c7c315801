//! Bounded-time loading.
//!
//! Loads run on a background thread and report back through a
//! `crossbeam_channel`. When the deadline passes the caller gets
//! [`Error::Timeout`] and the worker is left to finish on its own; its
//! result is dropped.

use crate::error::{Error, Result};
use crossbeam_channel::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Run `load`, failing with [`Error::Timeout`] if it does not finish within `timeout`.
///
/// `None` runs `load` inline with no deadline.
pub fn load_with_timeout<T, F>(timeout: Option<Duration>, load: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return load();
    };

    let (tx, rx) = crossbeam_channel::bounded(1);
    let start = Instant::now();

    std::thread::Builder::new()
        .name("geozonal-load".into())
        .spawn(move || {
            let _ = tx.send(load());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            tracing::debug!("load finished in {:.2?}", start.elapsed());
            result
        }
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!("load exceeded {:?}, abandoning", timeout);
            Err(Error::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::Other("load worker exited without a result".into()))
        }
    }
}
