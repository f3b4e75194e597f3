//! Durable application key-value store.
//!
//! The store owns the authoritative in-memory collections: validated user
//! profiles plus the per-user feature collections and the lottery pool.
//! Persistence is atomic (temp file + rename), loads validate every record
//! and quarantine corrupted files, and lookups heal inconsistently-keyed
//! legacy entries as they are touched.

mod identity;
mod io;
mod types;

pub use identity::{normalize, CANONICAL_DOMAIN, GROUP_SUFFIX};
pub use types::{
    AuxKind, FileMeta, LoadOutcome, Profile, SaveReport, StoreError, SCHEMA_VERSION,
};

pub(crate) use types::StoreData;

use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The single authoritative in-memory application store.
///
/// Constructed once at process start and passed by reference (or cheaply
/// cloned; clones share state) to every consumer. All mutation goes
/// through this handle. One coarse lock guards the whole collection set,
/// which keeps the load-time snapshot/rollback and the save-time
/// serialization consistent.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<RwLock<StoreData>>,
    data_dir: PathBuf,
}

impl DataStore {
    /// Create an empty store persisting under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreData::default())),
            data_dir: data_dir.into(),
        }
    }

    /// Directory data files are written into.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Look up a profile by account identifier.
    ///
    /// Tries the exact key, then the normalized key, then a full scan
    /// comparing normalized forms of every stored key (this covers
    /// inconsistently-keyed legacy entries). A fallback hit backfills the
    /// record under both the queried key and its normalized form, so the
    /// next lookup is a direct hit.
    pub fn profile(&self, id: &str) -> Option<Profile> {
        if let Some(profile) = self.inner.read().profiles.get(id) {
            return Some(profile.clone());
        }

        let normalized = normalize(id);
        let mut data = self.inner.write();
        let hit = data.profiles.get(&normalized).cloned().or_else(|| {
            data.profiles
                .iter()
                .find(|(key, _)| normalize(key) == normalized)
                .map(|(_, profile)| profile.clone())
        })?;

        data.profiles.insert(id.to_string(), hit.clone());
        data.profiles.insert(normalized, hit.clone());
        Some(hit)
    }

    /// Insert or replace a profile under the normalized form of `id`.
    pub fn set_profile(&self, id: &str, profile: Profile) {
        self.inner.write().profiles.insert(normalize(id), profile);
    }

    /// Remove a profile, returning it when present under the exact or
    /// normalized key.
    pub fn remove_profile(&self, id: &str) -> Option<Profile> {
        let mut data = self.inner.write();
        let exact = data.profiles.remove(id);
        let normalized = data.profiles.remove(&normalize(id));
        exact.or(normalized)
    }

    /// Number of profile records currently held.
    pub fn profile_count(&self) -> usize {
        self.inner.read().profiles.len()
    }

    /// Fetch a record from an auxiliary collection.
    pub fn aux(&self, kind: AuxKind, id: &str) -> Option<Value> {
        let data = self.inner.read();
        let collection = data.aux(kind);
        collection
            .get(id)
            .or_else(|| collection.get(&normalize(id)))
            .cloned()
    }

    /// Insert or replace a record in an auxiliary collection, keyed by the
    /// normalized form of `id`.
    pub fn set_aux(&self, kind: AuxKind, id: &str, value: Value) {
        self.inner
            .write()
            .aux_mut(kind)
            .insert(normalize(id), value);
    }

    /// Remove a record from an auxiliary collection.
    pub fn remove_aux(&self, kind: AuxKind, id: &str) -> Option<Value> {
        let mut data = self.inner.write();
        let collection = data.aux_mut(kind);
        let exact = collection.remove(id);
        let normalized = collection.remove(&normalize(id));
        exact.or(normalized)
    }

    /// Current lottery pool, in entry order.
    pub fn lottery(&self) -> Vec<Value> {
        self.inner.read().lottery.clone()
    }

    /// Append an entry to the lottery pool.
    pub fn push_lottery(&self, entry: Value) {
        self.inner.write().lottery.push(entry);
    }

    /// Drain the lottery pool, returning all entries.
    pub fn drain_lottery(&self) -> Vec<Value> {
        std::mem::take(&mut self.inner.write().lottery)
    }
}
