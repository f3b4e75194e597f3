//! Redundant credential snapshot storage.
//!
//! Every backup cycle writes the opaque session credentials to several
//! independent storage roots: a timestamp-named snapshot plus an
//! always-current `creds-latest.json` pointer per root. Restore walks the
//! roots in configured priority order and returns the first snapshot whose
//! digest checks out. No root is authoritative; partial failure degrades
//! redundancy, never availability.

mod manager;
mod restore;
mod types;

pub use manager::BackupManager;
pub use restore::RestoreResolver;
pub use types::{
    BackupConfig, BackupEnvelope, BackupError, BackupMeta, BackupReport, LocationOutcome,
    RestoredCredentials, DEFAULT_RETENTION, LATEST_FILE,
};

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::utils;

/// List the timestamp-named snapshot files under `root`, paired with the
/// timestamp embedded in each name. The latest pointer is not included.
pub(crate) async fn list_snapshots(root: &Path) -> io::Result<Vec<(i64, PathBuf)>> {
    let mut entries = utils::timed("read backup directory", fs::read_dir(root)).await?;
    let mut snapshots = Vec::new();
    while let Some(entry) = utils::timed("read backup directory entry", entries.next_entry()).await?
    {
        if let Some(name) = entry.file_name().to_str() {
            if let Some(timestamp) = types::snapshot_timestamp(name) {
                snapshots.push((timestamp, entry.path()));
            }
        }
    }
    Ok(snapshots)
}
