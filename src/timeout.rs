//! Deadline guard converting a hung operation into a failure.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Race `operation` against a hard deadline.
///
/// If the deadline fires first, returns [`Error::Timeout`] naming the server
/// and the configured duration. The in-process future is dropped at that
/// point, but any work it already handed to the OS is *not* cancelled; in
/// particular, a child process spawned by a timed-out start attempt keeps
/// running and must be reaped by a later stop or orphan cleanup. This weak
/// cancellation guarantee is deliberate; see the crate documentation.
pub async fn with_timeout<T, F>(name: &str, duration: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_elapsed) => Err(Error::Timeout {
            name: name.to_string(),
            duration,
        }),
    }
}
