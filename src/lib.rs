//! # Botvault
//!
//! Durable persistence and recovery for stateful chat bots.
//!
//! A bot process carries two kinds of state that must survive restarts,
//! flaky filesystems, and interrupted writes: an opaque session-credential
//! blob and the application's key-value data (user profiles and per-user
//! feature collections). Botvault keeps both safe without ever crashing the
//! host process on a storage failure.
//!
//! ## Overview
//!
//! ```rust,no_run
//! use botvault::backup::{BackupConfig, BackupManager, RestoreResolver};
//! use botvault::store::DataStore;
//! use serde_json::json;
//!
//! # async fn example() -> botvault::Result<()> {
//! // One store object, constructed at process start and passed around.
//! let store = DataStore::new("./data");
//! store.load_all("data.json").await?;
//!
//! // Redundant credential snapshots across independent storage roots.
//! let config = BackupConfig::new(vec!["./backups".into(), "/var/bot/backups".into()]);
//! let manager = BackupManager::new(config.clone());
//! manager.create_backup(&json!({"session": "..."})).await?;
//!
//! // At startup: most trustworthy snapshot wins, or fall back to pairing.
//! let resolver = RestoreResolver::new(config);
//! if let Some(restored) = resolver.restore_backup().await {
//!     println!("recovered credentials from {}", restored.source.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key guarantees
//!
//! - **Atomic replacement**: the data file is always either the previous
//!   snapshot or the fully written new one, never an intermediate state
//! - **Integrity verification**: credential snapshots carry a SHA-256
//!   digest that is recomputed before any snapshot is trusted
//! - **Corruption quarantine**: unparsable files are preserved under a
//!   timestamped name for inspection instead of blocking startup
//! - **Location independence**: one unwritable backup root never blocks
//!   the others
//!
//! ## Modules
//!
//! - [`backup`]: multi-location credential snapshots and restore resolution
//! - [`transport`]: portable credential blobs with format auto-detection
//! - [`store`]: the durable application key-value store
//! - [`scheduler`]: background save/backup cycles and shutdown hooks
//! - [`integrity`]: payload digest computation and verification

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for botvault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for botvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Credential backup or restore error
    #[error("Backup error: {0}")]
    Backup(#[from] backup::BackupError),

    /// Application store persistence error
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// Credential transport encoding/decoding error
    #[error("Codec error: {0}")]
    Codec(#[from] transport::CodecError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Join error from async tasks
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Multi-location credential backup and restore
pub mod backup;

/// Payload integrity verification
pub mod integrity;

/// Background scheduling and shutdown hooks
pub mod scheduler;

/// Durable application key-value store
pub mod store;

/// Credential transport codec
pub mod transport;

/// Shared filesystem helpers
pub mod utils;
