//! Restore resolution across backup locations.

use super::types::{BackupConfig, BackupEnvelope, RestoredCredentials, LATEST_FILE};
use crate::{integrity, utils};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Recovers the most trustworthy credential snapshot available.
///
/// Locations are tried in configured priority order. Within a location the
/// verified latest pointer wins; a missing, unparsable, or digest-failing
/// pointer falls back to the timestamped snapshots, newest first. The first
/// acceptable payload anywhere ends the search.
pub struct RestoreResolver {
    config: BackupConfig,
}

impl RestoreResolver {
    /// Create a resolver over the given configuration.
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    /// Resolve the best available snapshot, or `None` when no location
    /// holds anything restorable. `None` is not an error: the caller
    /// proceeds to a fresh pairing with empty credential state.
    pub async fn restore_backup(&self) -> Option<RestoredCredentials> {
        for root in &self.config.locations {
            match utils::timed("probe backup location", fs::metadata(root)).await {
                Ok(meta) if meta.is_dir() => {}
                _ => {
                    debug!(root = %root.display(), "backup location inaccessible, skipping");
                    continue;
                }
            }

            let latest = root.join(LATEST_FILE);
            if let Some(found) = self.read_envelope(&latest).await {
                info!(
                    source = %found.source.display(),
                    timestamp = found.timestamp,
                    verified = found.verified,
                    "credentials restored from latest pointer"
                );
                return Some(found);
            }

            if let Some(found) = self.try_snapshots(root).await {
                info!(
                    source = %found.source.display(),
                    timestamp = found.timestamp,
                    verified = found.verified,
                    "credentials restored from historical snapshot"
                );
                return Some(found);
            }
        }

        info!("no restorable credential backup found in any location");
        None
    }

    async fn try_snapshots(&self, root: &Path) -> Option<RestoredCredentials> {
        let mut snapshots = match super::list_snapshots(root).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "could not list snapshots");
                return None;
            }
        };
        snapshots.sort_by_key(|(timestamp, _)| std::cmp::Reverse(*timestamp));

        for (_, path) in snapshots {
            if let Some(found) = self.read_envelope(&path).await {
                return Some(found);
            }
        }
        None
    }

    /// Read one backup file and decide whether to trust it. Untrustworthy
    /// files are skipped, never retried.
    async fn read_envelope(&self, path: &Path) -> Option<RestoredCredentials> {
        let raw = match utils::timed("read backup file", fs::read_to_string(path)).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "backup file unreadable");
                return None;
            }
        };

        let envelope: BackupEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "backup file failed to parse");
                return None;
            }
        };

        let verified = match envelope.meta.checksum.as_deref() {
            Some(expected) => {
                if !integrity::verify(&envelope.creds, expected) {
                    warn!(path = %path.display(), "digest mismatch, backup file untrusted");
                    return None;
                }
                true
            }
            None => {
                // Files from older deployments carry no checksum; parsing
                // is the only acceptance gate available for them.
                debug!(path = %path.display(), "legacy backup without checksum accepted on parse");
                false
            }
        };

        Some(RestoredCredentials {
            creds: envelope.creds,
            source: path.to_path_buf(),
            verified,
            timestamp: envelope.meta.timestamp,
        })
    }
}
