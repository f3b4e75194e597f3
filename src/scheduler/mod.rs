//! Background save/backup scheduling and shutdown hooks.
//!
//! The scheduler drives periodic persistence cycles independent of command
//! handling: a recurring store flush and a recurring credential backup.
//! Cycles never overlap themselves, restarts replace rather than stack,
//! and stopping only prevents future cycles; an in-flight cycle always
//! runs to completion. Final flushes on exit go through an explicit
//! [`ShutdownRegistry`] invoked by the host's own shutdown sequence.

use crate::backup::BackupManager;
use crate::store::DataStore;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default interval between automatic store flushes.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

/// Collaborator returning the current live credential object on demand.
///
/// Implemented by the session-owning side of the host; this subsystem
/// never interprets the returned payload.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The credential object to snapshot right now.
    async fn current_credentials(&self) -> anyhow::Result<Value>;
}

struct Job {
    cancel: Arc<Notify>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

/// Drives recurring persistence cycles for one store.
pub struct Scheduler {
    store: DataStore,
    data_file: String,
    save_job: Mutex<Option<Job>>,
    backup_job: Mutex<Option<Job>>,
    save_cycle: Arc<Mutex<()>>,
    backup_cycle: Arc<Mutex<()>>,
}

impl Scheduler {
    /// Create a scheduler flushing `store` to `data_file`.
    pub fn new(store: DataStore, data_file: impl Into<String>) -> Self {
        Self {
            store,
            data_file: data_file.into(),
            save_job: Mutex::new(None),
            backup_job: Mutex::new(None),
            save_cycle: Arc::new(Mutex::new(())),
            backup_cycle: Arc::new(Mutex::new(())),
        }
    }

    /// Start the recurring store flush. Hosts usually pass
    /// [`DEFAULT_AUTOSAVE_INTERVAL`]. Calling again replaces the previous
    /// schedule instead of stacking a second one.
    pub async fn start_auto_save(&self, interval: Duration) {
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::clone(&cancel);
        let store = self.store.clone();
        let file = self.data_file.clone();
        let cycle = Arc::clone(&self.save_cycle);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the cycle belongs at
            // the end of the first interval, not at startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Ok(_guard) = cycle.try_lock() else {
                            warn!("previous auto-save still running, tick skipped");
                            continue;
                        };
                        match store.save_all(&file).await {
                            Ok(report) => {
                                debug!(profiles = report.profile_count, "auto-save cycle complete")
                            }
                            Err(e) => warn!(error = %e, "auto-save cycle failed"),
                        }
                    }
                    _ = cancelled.notified() => break,
                }
            }
            debug!("auto-save task stopped");
        });

        self.replace_job(&self.save_job, Job { cancel, handle }, "auto-save")
            .await;
        info!(interval = ?interval, "auto-save scheduled");
    }

    /// Stop the recurring store flush. Idempotent; an in-flight save is
    /// not interrupted.
    pub async fn stop_auto_save(&self) {
        Self::stop_job(&self.save_job, "auto-save").await;
    }

    /// Start the recurring credential backup: each cycle asks `provider`
    /// for the current credential object and hands it to `manager`.
    /// Calling again replaces the previous schedule.
    pub async fn start_credential_backup(
        &self,
        interval: Duration,
        provider: Arc<dyn CredentialSource>,
        manager: Arc<BackupManager>,
    ) {
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::clone(&cancel);
        let cycle = Arc::clone(&self.backup_cycle);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Ok(_guard) = cycle.try_lock() else {
                            warn!("previous credential backup still running, tick skipped");
                            continue;
                        };
                        let creds = match provider.current_credentials().await {
                            Ok(creds) => creds,
                            Err(e) => {
                                warn!(error = %e, "credential provider unavailable, cycle skipped");
                                continue;
                            }
                        };
                        match manager.create_backup(&creds).await {
                            Ok(report) => debug!(
                                verified = report.verified_count(),
                                "credential backup cycle complete"
                            ),
                            Err(e) => warn!(error = %e, "credential backup cycle failed"),
                        }
                    }
                    _ = cancelled.notified() => break,
                }
            }
            debug!("credential backup task stopped");
        });

        self.replace_job(&self.backup_job, Job { cancel, handle }, "credential-backup")
            .await;
        info!(interval = ?interval, "credential backup scheduled");
    }

    /// Stop the recurring credential backup. Idempotent.
    pub async fn stop_credential_backup(&self) {
        Self::stop_job(&self.backup_job, "credential-backup").await;
    }

    async fn replace_job(&self, slot: &Mutex<Option<Job>>, job: Job, name: &str) {
        let mut slot = slot.lock().await;
        if let Some(old) = slot.take() {
            // Signal, don't abort: a cycle that already started finishes.
            old.cancel.notify_one();
            info!(job = name, "replacing existing schedule");
        }
        *slot = Some(job);
    }

    async fn stop_job(slot: &Mutex<Option<Job>>, name: &str) {
        let mut slot = slot.lock().await;
        if let Some(job) = slot.take() {
            job.cancel.notify_one();
            info!(job = name, "schedule stopped");
        }
    }
}

type Hook = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Named flush hooks run by the host's controlled shutdown sequence.
///
/// Replaces ambient process signal handlers: the host decides when
/// shutdown starts and calls [`ShutdownRegistry::run`] exactly once. A
/// failing hook is logged and the remaining hooks still run, so a broken
/// flush never blocks process exit.
#[derive(Default)]
pub struct ShutdownRegistry {
    hooks: parking_lot::Mutex<Vec<(String, Hook)>>,
}

impl ShutdownRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named hook. Hooks run in registration order.
    pub fn register<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.hooks.lock().push((name.into(), Box::new(hook)));
    }

    /// Register the final store flush the host must run before exit.
    pub fn register_store_flush(&self, store: &DataStore, file_name: &str) {
        let store = store.clone();
        let file = file_name.to_string();
        self.register("store-flush", move || {
            let store = store.clone();
            let file = file.clone();
            Box::pin(async move {
                store.save_all(&file).await?;
                Ok(())
            })
        });
    }

    /// Run every registered hook once, in order. Failures are logged and
    /// skipped; this never returns an error and never panics.
    pub async fn run(&self) {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for (name, hook) in hooks {
            info!(hook = %name, "running shutdown hook");
            if let Err(e) = hook().await {
                error!(hook = %name, error = %e, "shutdown hook failed, continuing");
            }
        }
    }
}
