//! Backup system types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Default number of timestamped snapshots retained per location.
pub const DEFAULT_RETENTION: usize = 10;

/// File name of the always-current backup in each location. Overwritten on
/// every cycle, never pruned.
pub const LATEST_FILE: &str = "creds-latest.json";

/// Format version tag written into every envelope.
pub const FORMAT_VERSION: &str = "1.0";

const SNAPSHOT_PREFIX: &str = "creds-";
const SNAPSHOT_SUFFIX: &str = ".json";

/// Configuration for backup creation and restore resolution.
///
/// Locations are independent storage roots; their position in the list is
/// their restore priority.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Ordered storage roots, highest priority first.
    pub locations: Vec<PathBuf>,
    /// Maximum timestamped snapshots kept per location.
    pub retention: usize,
    /// Session label stamped into envelope metadata.
    pub session: String,
    /// Envelope format version tag.
    pub version: String,
}

impl BackupConfig {
    /// Config with default retention and session label.
    pub fn new(locations: Vec<PathBuf>) -> Self {
        Self {
            locations,
            retention: DEFAULT_RETENTION,
            session: "default".to_string(),
            version: FORMAT_VERSION.to_string(),
        }
    }

    /// Override the per-location retention limit.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Override the session label stamped into envelopes.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }
}

/// On-disk envelope wrapping the opaque credential payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEnvelope {
    /// The opaque credential payload. Never interpreted here.
    pub creds: Value,
    /// Write-time metadata.
    pub meta: BackupMeta,
}

/// Metadata stamped on every backup envelope at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMeta {
    /// Write time, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// SHA-256 digest of the canonical payload serialization. Absent only
    /// in files written by older deployments.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Session label the envelope belongs to.
    #[serde(default)]
    pub session: String,
    /// Envelope format version tag.
    #[serde(default)]
    pub version: String,
}

/// Outcome of one location's write attempt within a backup cycle.
#[derive(Debug, Clone)]
pub struct LocationOutcome {
    /// The storage root this outcome describes.
    pub root: PathBuf,
    /// True when the just-written latest pointer re-read with a matching
    /// digest.
    pub verified: bool,
    /// The failure, when the write or verification did not succeed.
    pub error: Option<String>,
}

/// Result of a full backup cycle across all configured locations.
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// The cycle's snapshot timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Digest shared by every copy written this cycle.
    pub checksum: String,
    /// Per-location outcomes, in configuration order.
    pub locations: Vec<LocationOutcome>,
}

impl BackupReport {
    /// Number of locations whose write was verified.
    pub fn verified_count(&self) -> usize {
        self.locations.iter().filter(|l| l.verified).count()
    }
}

/// Credentials recovered by the restore resolver.
#[derive(Debug, Clone)]
pub struct RestoredCredentials {
    /// The recovered opaque payload.
    pub creds: Value,
    /// File the payload was read from.
    pub source: PathBuf,
    /// True when the file carried a digest and it matched; false for
    /// legacy files accepted on parse alone.
    pub verified: bool,
    /// The envelope's write timestamp, epoch milliseconds.
    pub timestamp: i64,
}

/// Errors raised by backup creation.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The payload was empty; nothing was written anywhere.
    #[error("empty credential payload rejected")]
    EmptyPayload,

    /// Every configured location failed its write or verification.
    #[error("no backup location could be written: {0}")]
    AllLocationsFailed(String),

    /// The payload could not be serialized into an envelope.
    #[error("failed to serialize backup envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// File name for the snapshot written at `timestamp`.
pub(crate) fn snapshot_name(timestamp: i64) -> String {
    format!("{}{}{}", SNAPSHOT_PREFIX, timestamp, SNAPSHOT_SUFFIX)
}

/// Parse the timestamp embedded in a snapshot file name. Returns `None`
/// for anything else, including the latest pointer.
pub(crate) fn snapshot_timestamp(name: &str) -> Option<i64> {
    name.strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_name_round_trip() {
        let name = snapshot_name(1700000000123);
        assert_eq!(name, "creds-1700000000123.json");
        assert_eq!(snapshot_timestamp(&name), Some(1700000000123));
    }

    #[test]
    fn test_snapshot_timestamp_rejects_other_files() {
        assert_eq!(snapshot_timestamp(LATEST_FILE), None);
        assert_eq!(snapshot_timestamp("creds-.json"), None);
        assert_eq!(snapshot_timestamp("data.json"), None);
        assert_eq!(snapshot_timestamp("creds-abc.json"), None);
    }

    #[test]
    fn test_config_builders() {
        let config = BackupConfig::new(vec!["/a".into(), "/b".into()])
            .with_retention(3)
            .with_session("primary");
        assert_eq!(config.locations.len(), 2);
        assert_eq!(config.retention, 3);
        assert_eq!(config.session, "primary");
        assert_eq!(config.version, FORMAT_VERSION);
    }
}
