use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BackupInfo, NamespaceId, StateStore, StoreError};
use crate::fs::{create_new_atomic, read_optional, write_json_atomic};
use crate::workflow::types::WorkflowState;

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "state.lock";
const BACKUP_DIR: &str = "backups";

/// JSON-file implementation of [`StateStore`].
///
/// Layout under the root:
///
/// ```text
/// namespaces/<encoded>/state.json
/// namespaces/<encoded>/state.lock
/// namespaces/<encoded>/backups/state-<timestamp>-<id>.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespaces_dir(&self) -> PathBuf {
        self.root.join("namespaces")
    }

    pub fn namespace_dir(&self, namespace: &NamespaceId) -> PathBuf {
        self.namespaces_dir().join(namespace.encoded())
    }

    pub fn state_path(&self, namespace: &NamespaceId) -> PathBuf {
        self.namespace_dir(namespace).join(STATE_FILE)
    }

    fn backup_dir(&self, namespace: &NamespaceId) -> PathBuf {
        self.namespace_dir(namespace).join(BACKUP_DIR)
    }

    fn resolve_backup(&self, namespace: &NamespaceId, backup: &Path) -> Result<PathBuf, StoreError> {
        let is_bare_name = backup.components().count() == 1;
        let path = if is_bare_name {
            self.backup_dir(namespace).join(backup)
        } else {
            backup.to_path_buf()
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(StoreError::BackupNotFound(path))
        }
    }

    /// Move an unreadable record aside so the evidence survives the next save.
    fn quarantine(&self, namespace: &NamespaceId, path: &Path) -> Option<PathBuf> {
        let target = self.namespace_dir(namespace).join(format!(
            "state.corrupt-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        match fs::rename(path, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(file = ?path, error = %e, "Failed to quarantine corrupt state file");
                None
            }
        }
    }

    fn corrupt(
        &self,
        namespace: &NamespaceId,
        path: &Path,
        reason: String,
    ) -> StoreError {
        let quarantined = self.quarantine(namespace, path);
        StoreError::Corrupt {
            namespace: namespace.to_string(),
            reason,
            quarantined,
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self, namespace: &NamespaceId) -> Result<Option<WorkflowState>, StoreError> {
        let path = self.state_path(namespace);
        let Some(contents) = read_optional(&path).map_err(|e| StoreError::io(&path, e))? else {
            debug!(namespace = %namespace, file = ?path, "No existing state file found");
            return Ok(None);
        };

        let state: WorkflowState = match serde_json::from_str(&contents) {
            Ok(state) => state,
            Err(e) => return Err(self.corrupt(namespace, &path, e.to_string())),
        };

        if state.namespace != namespace.as_str() {
            let reason = format!("record belongs to namespace '{}'", state.namespace);
            return Err(self.corrupt(namespace, &path, reason));
        }

        Ok(Some(state))
    }

    fn save(&self, namespace: &NamespaceId, state: &WorkflowState) -> Result<(), StoreError> {
        let path = self.state_path(namespace);
        write_json_atomic(&path, state).map_err(|e| StoreError::io(&path, e))?;
        debug!(
            namespace = %namespace,
            stage = %state.stage,
            history = state.history.len(),
            "State saved"
        );
        Ok(())
    }

    fn ensure_exists(
        &self,
        namespace: &NamespaceId,
        initial: &WorkflowState,
    ) -> Result<bool, StoreError> {
        let path = self.state_path(namespace);
        let serialized = serde_json::to_vec_pretty(initial)?;
        create_new_atomic(&path, &serialized).map_err(|e| StoreError::io(&path, e))
    }

    fn backup(
        &self,
        namespace: &NamespaceId,
        state: &WorkflowState,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.backup_dir(namespace);
        let short_id = Uuid::new_v4().simple().to_string();
        let path = dir.join(format!(
            "state-{}-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            &short_id[..8]
        ));
        let serialized = serde_json::to_vec_pretty(state)?;
        if !create_new_atomic(&path, &serialized).map_err(|e| StoreError::io(&path, e))? {
            return Err(StoreError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "backup name collision"),
            ));
        }
        info!(namespace = %namespace, backup = ?path, stage = %state.stage, "Backup written");
        Ok(path)
    }

    fn list_backups(&self, namespace: &NamespaceId) -> Result<Vec<BackupInfo>, StoreError> {
        let dir = self.backup_dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut backups = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !(name.starts_with("state-") && name.ends_with(".json")) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                let created_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                backups.push(BackupInfo {
                    path,
                    created_at,
                    size_bytes: metadata.len(),
                });
            }
        }

        // Names embed the timestamp, so they break ties within one mtime tick.
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.path.cmp(&b.path)));
        Ok(backups)
    }

    fn read_backup(
        &self,
        namespace: &NamespaceId,
        backup: &Path,
    ) -> Result<(PathBuf, WorkflowState), StoreError> {
        let path = self.resolve_backup(namespace, backup)?;
        let contents = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let state = serde_json::from_str(&contents)?;
        Ok((path, state))
    }

    fn remove_backup(&self, namespace: &NamespaceId, backup: &Path) -> Result<(), StoreError> {
        let path = self.resolve_backup(namespace, backup)?;
        fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))
    }

    fn list(&self) -> Result<Vec<NamespaceId>, StoreError> {
        let dir = self.namespaces_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut namespaces: Vec<NamespaceId> = entries
            .flatten()
            .filter(|entry| entry.path().join(STATE_FILE).is_file())
            .filter_map(|entry| NamespaceId::decode(&entry.file_name().to_string_lossy()))
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }

    fn lock_path(&self, namespace: &NamespaceId) -> Option<PathBuf> {
        Some(self.namespace_dir(namespace).join(LOCK_FILE))
    }
}
