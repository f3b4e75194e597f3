//! Atomic persistence for the application store.

use super::types::{
    DataFile, FileMeta, LoadOutcome, Profile, SaveReport, StoreData, StoreError, SCHEMA_VERSION,
};
use super::{normalize, AuxKind, DataStore};
use crate::utils;
use chrono::Utc;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl DataStore {
    /// Persist the full collection set to `file_name` under the data
    /// directory.
    ///
    /// The write is atomic: the snapshot lands in a uniquely-named temp
    /// file in the same directory, is re-read and re-parsed as a defensive
    /// check, and only then renamed onto the target. Any failure leaves
    /// the previous data file untouched.
    pub async fn save_all(&self, file_name: &str) -> Result<SaveReport, StoreError> {
        let target = self.data_dir().join(file_name);

        utils::ensure_dir(self.data_dir())
            .await
            .map_err(|e| StoreError::DirectoryUnavailable {
                path: self.data_dir().to_path_buf(),
                source: e,
            })?;

        // Best-effort safety copy of the current file; losing it only
        // costs the secondary fallback, so failure is non-fatal.
        let backup = target.with_extension("json.bak");
        match utils::timed("refresh .bak copy", fs::copy(&target, &backup)).await {
            Ok(_) => debug!(path = %backup.display(), "refreshed .bak copy"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "could not refresh .bak copy"),
        }

        // Serialize under the read lock so no command handler can mutate
        // records mid-snapshot.
        let (body, meta) = {
            let data = self.inner.read();
            let meta = FileMeta {
                version: SCHEMA_VERSION,
                saved_at: Utc::now().to_rfc3339(),
                profile_count: data.profiles.len(),
                invalid_profile_count: data.invalid_profiles,
            };
            let file = DataFile {
                profiles: &data.profiles,
                games: &data.games,
                marriages: &data.marriages,
                bank: &data.bank,
                jobs: &data.jobs,
                pets: &data.pets,
                afk: &data.afk,
                streaks: &data.streaks,
                checkins: &data.checkins,
                lottery: &data.lottery,
                meta: meta.clone(),
            };
            (serde_json::to_string_pretty(&file)?, meta)
        };

        // Same directory as the target: rename is only atomic within one
        // filesystem.
        let temp = self
            .data_dir()
            .join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let committed: Result<(), StoreError> = async {
            utils::timed("write temp data file", fs::write(&temp, &body))
                .await
                .map_err(|e| StoreError::WriteFailed {
                    path: temp.clone(),
                    source: e,
                })?;

            let reread = utils::timed("re-read temp data file", fs::read_to_string(&temp))
                .await
                .map_err(|e| StoreError::WriteFailed {
                    path: temp.clone(),
                    source: e,
                })?;
            serde_json::from_str::<Value>(&reread)
                .map_err(|e| StoreError::ValidationFailed(e.to_string()))?;

            utils::timed("rename temp onto target", fs::rename(&temp, &target))
                .await
                .map_err(|e| StoreError::WriteFailed {
                    path: target.clone(),
                    source: e,
                })?;
            Ok(())
        }
        .await;

        if let Err(e) = committed {
            let _ = utils::timed("remove failed temp file", fs::remove_file(&temp)).await;
            error!(path = %target.display(), error = %e, "store flush failed, previous file kept");
            return Err(e);
        }

        self.sweep_stray_temps(file_name).await;

        info!(
            path = %target.display(),
            profiles = meta.profile_count,
            "store flushed"
        );
        Ok(SaveReport {
            path: target,
            profile_count: meta.profile_count,
            invalid_profile_count: meta.invalid_profile_count,
            saved_at: meta.saved_at,
        })
    }

    /// Remove temp files a previously interrupted save left behind. The
    /// committed temp was already renamed away, so anything still matching
    /// the pattern is an orphan.
    async fn sweep_stray_temps(&self, file_name: &str) {
        let prefix = format!(".{}.", file_name);
        let Ok(mut entries) = utils::timed("scan for stray temps", fs::read_dir(self.data_dir())).await
        else {
            return;
        };
        while let Ok(Some(entry)) = utils::timed("scan for stray temps", entries.next_entry()).await
        {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(&prefix) && name.ends_with(".tmp") {
                    debug!(path = %entry.path().display(), "removing stray temp file");
                    let _ = utils::timed("remove stray temp file", fs::remove_file(entry.path()))
                        .await;
                }
            }
        }
    }

    /// Load the collection set from `file_name` under the data directory.
    ///
    /// A missing file is not an error: startup proceeds with empty state.
    /// An unparsable file is quarantined for inspection and reported as
    /// corrupted without touching the live collections. A parsable file
    /// replaces the live collections wholesale; if repopulation fails
    /// midway, the pre-load state is rolled back.
    pub async fn load_all(&self, file_name: &str) -> Result<LoadOutcome, StoreError> {
        let source = self.data_dir().join(file_name);

        let raw = match utils::timed("read data file", fs::read_to_string(&source)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %source.display(), "no data file yet, starting empty");
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => {
                return Err(StoreError::ReadFailed {
                    path: source,
                    source: e,
                })
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(parse_err) => {
                let quarantine = quarantine_path(&source);
                match utils::timed("quarantine corrupted data file", fs::copy(&source, &quarantine))
                    .await
                {
                    Ok(_) => {
                        warn!(
                            path = %source.display(),
                            quarantine = %quarantine.display(),
                            error = %parse_err,
                            "data file unparsable, quarantined for inspection"
                        )
                    }
                    Err(copy_err) => {
                        error!(
                            path = %source.display(),
                            error = %copy_err,
                            "data file unparsable and quarantine copy failed"
                        )
                    }
                }
                return Err(StoreError::Corrupted {
                    path: source,
                    quarantine,
                });
            }
        };

        // Snapshot, clear, repopulate, and roll back on failure in one
        // uninterrupted section under the write lock, so no reader ever
        // observes a partially populated store.
        let mut data = self.inner.write();
        let snapshot = data.clone();
        *data = StoreData::default();
        match populate(&mut data, &parsed) {
            Ok((profiles, skipped)) => {
                info!(
                    path = %source.display(),
                    profiles,
                    skipped,
                    "store loaded"
                );
                Ok(LoadOutcome::Loaded { profiles, skipped })
            }
            Err(reason) => {
                *data = snapshot;
                error!(
                    path = %source.display(),
                    error = %reason,
                    "store load failed, previous in-memory state restored"
                );
                Err(StoreError::ValidationFailed(reason))
            }
        }
    }
}

/// Rebuild the collection set from a parsed data file. Returns the number
/// of profiles loaded and the number of records skipped as invalid.
fn populate(data: &mut StoreData, parsed: &Value) -> Result<(usize, usize), String> {
    let root = parsed
        .as_object()
        .ok_or_else(|| "data file root is not an object".to_string())?;

    let mut loaded = 0usize;
    let mut skipped = 0usize;

    if let Some(profiles) = root.get("profiles").and_then(Value::as_object) {
        for (key, value) in profiles {
            match Profile::from_value(value) {
                Some(profile) => {
                    let canonical = normalize(key);
                    if canonical != *key {
                        // Keep the legacy key too so old lookups still hit.
                        data.profiles.insert(key.clone(), profile.clone());
                    }
                    data.profiles.insert(canonical, profile);
                    loaded += 1;
                }
                None => {
                    warn!(key = %key, "profile entry not object-shaped, skipped");
                    skipped += 1;
                }
            }
        }
    }

    for kind in AuxKind::ALL {
        if let Some(records) = root.get(kind.key()).and_then(Value::as_object) {
            let collection = data.aux_mut(kind);
            for (key, value) in records {
                let canonical = normalize(key);
                if canonical != *key {
                    collection.insert(key.clone(), value.clone());
                }
                collection.insert(canonical, value.clone());
            }
        }
    }

    if let Some(lottery) = root.get("lottery").and_then(Value::as_array) {
        data.lottery = lottery.clone();
    }

    data.invalid_profiles = skipped;
    Ok((loaded, skipped))
}

fn quarantine_path(source: &Path) -> PathBuf {
    PathBuf::from(format!(
        "{}.corrupted.{}",
        source.display(),
        Utc::now().timestamp_millis()
    ))
}
