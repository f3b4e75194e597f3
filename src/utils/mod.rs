//! Shared filesystem helpers.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Upper bound applied to every filesystem call in this crate.
///
/// A hung or unreachable storage root suspends only the operation that
/// touched it, never the whole process.
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a filesystem future under the crate-wide [`IO_TIMEOUT`].
///
/// `what` names the operation for the timeout error message.
pub async fn timed<T, F>(what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(IO_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", what, IO_TIMEOUT),
        )),
    }
}

/// Idempotent directory creation; "already exists" is success.
pub async fn ensure_dir(path: &Path) -> io::Result<()> {
    timed("create_dir_all", fs::create_dir_all(path)).await
}
