//! Manual reset, restore from backup, and housekeeping.
//!
//! Every destructive operation writes a backup of the live record first.
//! If that backup cannot be written the operation fails and the live record
//! is left untouched.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::engine::{GateError, WorkflowEngine};
use super::types::{ContextBlobs, Stage, Trigger, WorkflowState};
use crate::journal::{JournalEntry, JournalEvent};
use crate::store::{BackupInfo, NamespaceId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub namespace: String,
    pub stage_before: Stage,
    /// `None` when there was no persisted record to back up.
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub namespace: String,
    pub restored_from: PathBuf,
    pub stage_before: Stage,
    pub stage_after: Stage,
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub reset: Vec<String>,
    pub failed: Vec<String>,
}

/// Return the record to `INITIAL`, dropping per-run data and keeping history
/// and outstanding documentation obligations.
pub(crate) fn apply_reset(state: &mut WorkflowState, trigger: Trigger, reason: &str, now: DateTime<Utc>) {
    state.mode = None;
    state.active_action = None;
    state.context = ContextBlobs::default();
    state.record("reset", Stage::Initial, trigger, Some(reason.to_string()), None, now);
}

impl WorkflowEngine {
    /// Back up and reset a namespace to `INITIAL`.
    pub fn reset(&self, namespace: &NamespaceId, reason: &str) -> Result<ResetReport, GateError> {
        let now = self.clock.now();

        self.with_namespace_lock(namespace, || -> Result<ResetReport, GateError> {
            let existing = self.load_usable(namespace, now)?;
            let backup = match &existing {
                Some(state) => Some(self.store.backup(namespace, state)?),
                None => None,
            };

            let mut state = existing.unwrap_or_else(|| WorkflowState::new(namespace.as_str(), now));
            let stage_before = state.stage;
            apply_reset(&mut state, Trigger::ManualReset, reason, now);
            self.store.save(namespace, &state)?;

            info!(namespace = %namespace, stage_before = %stage_before, backup = ?backup, "Workflow reset");
            self.journal.record(
                JournalEntry::new(namespace, JournalEvent::Reset, now)
                    .action("reset")
                    .stages(stage_before, Stage::Initial)
                    .reason(reason),
            );

            Ok(ResetReport {
                namespace: namespace.to_string(),
                stage_before,
                backup,
            })
        })
    }

    /// Reinstate a backup, keeping the live record's history.
    ///
    /// `backup` may be a bare file name inside the namespace's backup
    /// directory or a full path.
    pub fn restore(&self, namespace: &NamespaceId, backup: &Path) -> Result<RestoreReport, GateError> {
        let now = self.clock.now();

        self.with_namespace_lock(namespace, || -> Result<RestoreReport, GateError> {
            let (restored_from, restored) = self.store.read_backup(namespace, backup)?;
            if restored.namespace != namespace.as_str() {
                return Err(GateError::ForeignBackup {
                    backup: restored_from,
                    owner: restored.namespace,
                });
            }

            let existing = self.load_usable(namespace, now)?;
            let safety = match &existing {
                Some(state) => Some(self.store.backup(namespace, state)?),
                None => None,
            };

            let mut state = existing.unwrap_or_else(|| WorkflowState::new(namespace.as_str(), now));
            let stage_before = state.stage;
            state.mode = restored.mode;
            state.context = restored.context;
            state.active_action = None;
            state.documentation_pending = restored.documentation_pending;
            state.documentation_checklist = restored.documentation_checklist;
            let reason = format!("restored from {}", restored_from.display());
            state.record("restore", restored.stage, Trigger::ManualReset, Some(reason.clone()), None, now);
            self.store.save(namespace, &state)?;

            info!(
                namespace = %namespace,
                backup = ?restored_from,
                stage_before = %stage_before,
                stage_after = %restored.stage,
                "Workflow restored from backup"
            );
            self.journal.record(
                JournalEntry::new(namespace, JournalEvent::Restore, now)
                    .action("restore")
                    .stages(stage_before, restored.stage)
                    .reason(reason),
            );

            Ok(RestoreReport {
                namespace: namespace.to_string(),
                restored_from,
                stage_before,
                stage_after: restored.stage,
                backup: safety,
            })
        })
    }

    pub fn list_backups(&self, namespace: &NamespaceId) -> Result<Vec<BackupInfo>, GateError> {
        Ok(self.store.list_backups(namespace)?)
    }

    /// Delete backups older than `older_than`, returning how many went.
    pub fn prune_backups(&self, namespace: &NamespaceId, older_than: Duration) -> Result<usize, GateError> {
        let Some(cutoff) = self.clock.now().checked_sub_signed(older_than) else {
            return Ok(0);
        };
        let mut removed = 0;
        for backup in self.store.list_backups(namespace)? {
            if backup.created_at >= cutoff {
                continue;
            }
            match self.store.remove_backup(namespace, &backup.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(namespace = %namespace, backup = ?backup.path, error = %e, "Failed to remove backup"),
            }
        }
        if removed > 0 {
            info!(namespace = %namespace, removed, "Pruned old backups");
        }
        Ok(removed)
    }

    /// Apply staleness recovery to every namespace without waiting for a call.
    pub fn sweep(&self) -> Result<SweepReport, GateError> {
        let now = self.clock.now();
        let namespaces = self.store.list()?;
        let mut report = SweepReport {
            examined: namespaces.len(),
            reset: Vec::new(),
            failed: Vec::new(),
        };

        for namespace in namespaces {
            let result = self.with_namespace_lock(&namespace, || self.read_fresh(&namespace, now));
            match result {
                Ok((_, true)) => report.reset.push(namespace.to_string()),
                Ok((_, false)) => {}
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Sweep failed for namespace");
                    report.failed.push(namespace.to_string());
                }
            }
        }
        Ok(report)
    }
}
