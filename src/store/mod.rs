//! Durable per-namespace persistence of [`WorkflowState`].
//!
//! The engine talks to storage only through the [`StateStore`] trait so that
//! tests can swap in a mock and exercise the fail-open paths.

pub mod file_store;
pub mod namespace;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::workflow::types::WorkflowState;

pub use file_store::FileStateStore;
pub use namespace::{NamespaceId, NamespaceResolver};

/// Errors that can occur during state persistence operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State corruption detected for namespace '{namespace}': {reason}")]
    Corrupt {
        namespace: String,
        reason: String,
        quarantined: Option<PathBuf>,
    },

    #[error("Backup not found: {0:?}")]
    BackupNotFound(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A pre-reset copy of a namespace record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Storage for one record per namespace.
///
/// Implementations must make `save` all-or-nothing and must never let one
/// namespace observe another's record.
#[cfg_attr(test, automock)]
pub trait StateStore: Send + Sync {
    /// Current record, `Ok(None)` if the namespace has never been written.
    fn load(&self, namespace: &NamespaceId) -> Result<Option<WorkflowState>, StoreError>;

    /// Atomically replace the record.
    fn save(&self, namespace: &NamespaceId, state: &WorkflowState) -> Result<(), StoreError>;

    /// Create the record if absent. Returns `true` if this call created it.
    fn ensure_exists(
        &self,
        namespace: &NamespaceId,
        initial: &WorkflowState,
    ) -> Result<bool, StoreError>;

    /// Write a new, never-overwritten copy of `state` and return where it went.
    fn backup(&self, namespace: &NamespaceId, state: &WorkflowState)
        -> Result<PathBuf, StoreError>;

    /// Backups for the namespace, oldest first.
    fn list_backups(&self, namespace: &NamespaceId) -> Result<Vec<BackupInfo>, StoreError>;

    /// Read a backup by file name or path.
    fn read_backup(
        &self,
        namespace: &NamespaceId,
        backup: &Path,
    ) -> Result<(PathBuf, WorkflowState), StoreError>;

    fn remove_backup(&self, namespace: &NamespaceId, backup: &Path) -> Result<(), StoreError>;

    /// Namespaces that have a persisted record, sorted.
    fn list(&self) -> Result<Vec<NamespaceId>, StoreError>;

    /// Lock file serializing read-modify-write of one namespace, if the
    /// backend needs one.
    fn lock_path(&self, namespace: &NamespaceId) -> Option<PathBuf>;
}
