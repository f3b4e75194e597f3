//! Store data model and validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Schema version written into the data file's `_meta` block.
pub const SCHEMA_VERSION: u32 = 1;

/// A validated per-user profile record.
///
/// Field names are camelCase on disk so files written by earlier
/// deployments of the bot keep loading unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    /// Display name, free text.
    pub name: String,
    /// Profile bio, free text.
    pub bio: String,
    /// Progression level.
    pub level: u32,
    /// Accumulated experience points.
    pub xp: u64,
    /// Wallet balance; may go negative through fines.
    pub coins: i64,
    /// Owned item identifiers.
    pub inventory: Vec<String>,
    /// Registration time, epoch milliseconds.
    pub registered_at: i64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            bio: String::new(),
            level: 1,
            xp: 0,
            coins: 0,
            inventory: Vec::new(),
            registered_at: 0,
        }
    }
}

impl Profile {
    /// Build a profile from raw JSON, substituting type-safe defaults for
    /// missing or malformed fields.
    ///
    /// Returns `None` for values that are not even object-shaped; such
    /// entries are dropped and counted by the caller, not substituted.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let defaults = Profile::default();
        Some(Self {
            name: object
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&defaults.name)
                .to_string(),
            bio: object
                .get("bio")
                .and_then(Value::as_str)
                .unwrap_or(&defaults.bio)
                .to_string(),
            level: object
                .get("level")
                .and_then(Value::as_u64)
                .map(|level| level.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.level),
            xp: object.get("xp").and_then(Value::as_u64).unwrap_or(defaults.xp),
            coins: object
                .get("coins")
                .and_then(Value::as_i64)
                .unwrap_or(defaults.coins),
            inventory: object
                .get("inventory")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_else(|| defaults.inventory.clone()),
            registered_at: object
                .get("registeredAt")
                .and_then(Value::as_i64)
                .unwrap_or(defaults.registered_at),
        })
    }
}

/// The auxiliary per-user collections carried alongside profiles.
///
/// Their records are feature-owned blobs this subsystem persists without
/// interpreting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxKind {
    /// Running game sessions.
    Games,
    /// Marriage pairings.
    Marriages,
    /// Bank accounts.
    Bank,
    /// Job assignments.
    Jobs,
    /// Owned pets.
    Pets,
    /// Away-from-keyboard markers.
    Afk,
    /// Activity streaks.
    Streaks,
    /// Daily check-ins.
    Checkins,
}

impl AuxKind {
    /// Every auxiliary collection, in data-file order.
    pub const ALL: [AuxKind; 8] = [
        AuxKind::Games,
        AuxKind::Marriages,
        AuxKind::Bank,
        AuxKind::Jobs,
        AuxKind::Pets,
        AuxKind::Afk,
        AuxKind::Streaks,
        AuxKind::Checkins,
    ];

    /// The collection's key in the data file.
    pub fn key(self) -> &'static str {
        match self {
            AuxKind::Games => "games",
            AuxKind::Marriages => "marriages",
            AuxKind::Bank => "bank",
            AuxKind::Jobs => "jobs",
            AuxKind::Pets => "pets",
            AuxKind::Afk => "afk",
            AuxKind::Streaks => "streaks",
            AuxKind::Checkins => "checkins",
        }
    }
}

/// The in-memory collection set. One instance lives behind the store's
/// lock; `Clone` exists for the load-time snapshot/rollback.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreData {
    pub profiles: HashMap<String, Profile>,
    pub games: HashMap<String, Value>,
    pub marriages: HashMap<String, Value>,
    pub bank: HashMap<String, Value>,
    pub jobs: HashMap<String, Value>,
    pub pets: HashMap<String, Value>,
    pub afk: HashMap<String, Value>,
    pub streaks: HashMap<String, Value>,
    pub checkins: HashMap<String, Value>,
    pub lottery: Vec<Value>,
    /// Records dropped by the most recent load; persisted into `_meta`.
    pub invalid_profiles: usize,
}

impl StoreData {
    pub fn aux(&self, kind: AuxKind) -> &HashMap<String, Value> {
        match kind {
            AuxKind::Games => &self.games,
            AuxKind::Marriages => &self.marriages,
            AuxKind::Bank => &self.bank,
            AuxKind::Jobs => &self.jobs,
            AuxKind::Pets => &self.pets,
            AuxKind::Afk => &self.afk,
            AuxKind::Streaks => &self.streaks,
            AuxKind::Checkins => &self.checkins,
        }
    }

    pub fn aux_mut(&mut self, kind: AuxKind) -> &mut HashMap<String, Value> {
        match kind {
            AuxKind::Games => &mut self.games,
            AuxKind::Marriages => &mut self.marriages,
            AuxKind::Bank => &mut self.bank,
            AuxKind::Jobs => &mut self.jobs,
            AuxKind::Pets => &mut self.pets,
            AuxKind::Afk => &mut self.afk,
            AuxKind::Streaks => &mut self.streaks,
            AuxKind::Checkins => &mut self.checkins,
        }
    }
}

/// Metadata block written into the data file under `_meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    /// Data file schema version.
    pub version: u32,
    /// Save time, ISO-8601.
    pub saved_at: String,
    /// Valid profile records in this snapshot.
    pub profile_count: usize,
    /// Records dropped as invalid by the load that produced this state.
    pub invalid_profile_count: usize,
}

/// Serialization view of the full collection set plus metadata.
#[derive(Serialize)]
pub(crate) struct DataFile<'a> {
    pub profiles: &'a HashMap<String, Profile>,
    pub games: &'a HashMap<String, Value>,
    pub marriages: &'a HashMap<String, Value>,
    pub bank: &'a HashMap<String, Value>,
    pub jobs: &'a HashMap<String, Value>,
    pub pets: &'a HashMap<String, Value>,
    pub afk: &'a HashMap<String, Value>,
    pub streaks: &'a HashMap<String, Value>,
    pub checkins: &'a HashMap<String, Value>,
    pub lottery: &'a Vec<Value>,
    #[serde(rename = "_meta")]
    pub meta: FileMeta,
}

/// Successful save summary.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// Final path of the committed data file.
    pub path: PathBuf,
    /// Profile records written.
    pub profile_count: usize,
    /// Invalid records recorded in `_meta`.
    pub invalid_profile_count: usize,
    /// ISO-8601 save timestamp, as written into `_meta`.
    pub saved_at: String,
}

/// Successful load summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No data file on disk; the store stays empty and startup proceeds.
    Missing,
    /// The file was loaded.
    Loaded {
        /// Top-level profile records repopulated.
        profiles: usize,
        /// Records skipped as invalid.
        skipped: usize,
    },
}

/// Errors raised by store persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The data directory could not be created.
    #[error("failed to create data directory {path}: {source}")]
    DirectoryUnavailable {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A write, rename, or temp-file step failed; the previous data file
    /// is untouched.
    #[error("failed to write data file {path}: {source}")]
    WriteFailed {
        /// The file being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The data file could not be read.
    #[error("failed to read data file {path}: {source}")]
    ReadFailed {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The freshly written temp file did not parse back; the target was
    /// never touched.
    #[error("freshly written data file failed validation: {0}")]
    ValidationFailed(String),

    /// The data file is unparsable; a quarantine copy was kept.
    #[error("data file {path} is corrupted, quarantined at {quarantine}")]
    Corrupted {
        /// The corrupted data file.
        path: PathBuf,
        /// Where the unparsable content was preserved.
        quarantine: PathBuf,
    },

    /// The store state could not be serialized.
    #[error("failed to serialize store state: {0}")]
    Serialization(#[from] serde_json::Error),
}
