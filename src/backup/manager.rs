//! Multi-location credential backup writer.

use super::types::{
    snapshot_name, BackupConfig, BackupEnvelope, BackupError, BackupMeta, BackupReport,
    LocationOutcome, LATEST_FILE,
};
use crate::{integrity, utils};
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Writes credential snapshots to every configured storage root.
///
/// Locations are written concurrently and independently: one root's failure
/// is logged and never blocks the others. A cycle succeeds once at least
/// one root's latest pointer re-reads with a matching digest.
pub struct BackupManager {
    config: BackupConfig,
    // Snapshot file names embed the cycle timestamp; consecutive cycles
    // within one millisecond must still get distinct names.
    last_stamp: AtomicI64,
}

impl BackupManager {
    /// Create a manager over the given configuration.
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            last_stamp: AtomicI64::new(0),
        }
    }

    /// The configuration this manager writes with.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Write one backup cycle of `payload` to every configured location,
    /// then prune each location to the retention limit.
    pub async fn create_backup(&self, payload: &Value) -> Result<BackupReport, BackupError> {
        if payload_is_empty(payload) {
            error!("refusing to back up an empty credential payload");
            return Err(BackupError::EmptyPayload);
        }

        let timestamp = self.next_timestamp();
        let checksum = integrity::digest(payload);
        let envelope = BackupEnvelope {
            creds: payload.clone(),
            meta: BackupMeta {
                timestamp,
                checksum: Some(checksum.clone()),
                session: self.config.session.clone(),
                version: self.config.version.clone(),
            },
        };
        let body = serde_json::to_string_pretty(&envelope)?;

        info!(
            timestamp,
            locations = self.config.locations.len(),
            "starting credential backup cycle"
        );

        let writes = self
            .config
            .locations
            .iter()
            .map(|root| self.write_location(root, &body, timestamp, &checksum));
        let locations: Vec<LocationOutcome> = join_all(writes).await;

        // Retention runs after all writes were attempted, independently per
        // location; a failed prune is tolerated until the next cycle.
        join_all(
            self.config
                .locations
                .iter()
                .map(|root| self.prune_location(root)),
        )
        .await;

        let report = BackupReport {
            timestamp,
            checksum,
            locations,
        };

        if report.verified_count() == 0 {
            let summary = report
                .locations
                .iter()
                .filter_map(|l| {
                    l.error
                        .as_ref()
                        .map(|e| format!("{}: {}", l.root.display(), e))
                })
                .collect::<Vec<_>>()
                .join("; ");
            error!(timestamp, %summary, "credential backup failed at every location");
            return Err(BackupError::AllLocationsFailed(summary));
        }

        info!(
            timestamp,
            verified = report.verified_count(),
            total = report.locations.len(),
            "credential backup cycle complete"
        );
        Ok(report)
    }

    async fn write_location(
        &self,
        root: &Path,
        body: &str,
        timestamp: i64,
        checksum: &str,
    ) -> LocationOutcome {
        match self.try_write(root, body, timestamp, checksum).await {
            Ok(()) => {
                debug!(root = %root.display(), timestamp, "backup location written and verified");
                LocationOutcome {
                    root: root.to_path_buf(),
                    verified: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "backup location write failed");
                LocationOutcome {
                    root: root.to_path_buf(),
                    verified: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_write(
        &self,
        root: &Path,
        body: &str,
        timestamp: i64,
        checksum: &str,
    ) -> io::Result<()> {
        utils::ensure_dir(root).await?;

        let snapshot = root.join(snapshot_name(timestamp));
        utils::timed("write snapshot", fs::write(&snapshot, body)).await?;

        let latest = root.join(LATEST_FILE);
        utils::timed("write latest pointer", fs::write(&latest, body)).await?;

        // Trust only what actually landed on disk: re-read the latest
        // pointer and check its digest before counting this root.
        let raw = utils::timed("re-read latest pointer", fs::read_to_string(&latest)).await?;
        let written: BackupEnvelope = serde_json::from_str(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        if !integrity::verify(&written.creds, checksum) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "latest pointer failed digest verification after write",
            ));
        }
        Ok(())
    }

    async fn prune_location(&self, root: &Path) {
        if let Err(e) = self.try_prune(root).await {
            warn!(root = %root.display(), error = %e, "retention pruning failed");
        }
    }

    async fn try_prune(&self, root: &Path) -> io::Result<()> {
        let mut snapshots = super::list_snapshots(root).await?;
        if snapshots.len() <= self.config.retention {
            return Ok(());
        }

        snapshots.sort_by_key(|(timestamp, _)| *timestamp);
        let surplus = snapshots.len() - self.config.retention;
        for (timestamp, path) in snapshots.into_iter().take(surplus) {
            match utils::timed("delete pruned snapshot", fs::remove_file(&path)).await {
                Ok(()) => debug!(root = %root.display(), timestamp, "pruned snapshot"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "snapshot deletion failed, will retry next cycle")
                }
            }
        }
        Ok(())
    }

    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        loop {
            let prev = self.last_stamp.load(Ordering::SeqCst);
            let candidate = now.max(prev + 1);
            if self
                .last_stamp
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate;
            }
        }
    }
}

fn payload_is_empty(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_is_empty() {
        assert!(payload_is_empty(&Value::Null));
        assert!(payload_is_empty(&json!("")));
        assert!(payload_is_empty(&json!({})));
        assert!(payload_is_empty(&json!([])));
        assert!(!payload_is_empty(&json!({"k": 1})));
        assert!(!payload_is_empty(&json!("creds")));
        assert!(!payload_is_empty(&json!(0)));
    }

    #[test]
    fn test_next_timestamp_is_strictly_monotonic() {
        let manager = BackupManager::new(BackupConfig::new(vec![]));
        let mut last = 0;
        for _ in 0..100 {
            let stamp = manager.next_timestamp();
            assert!(stamp > last);
            last = stamp;
        }
    }
}
