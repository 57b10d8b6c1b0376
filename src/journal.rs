//! Append-only audit journal.
//!
//! One JSON object per line, one line per decision. The journal never reads
//! its own output on the hot path and each record is a single append, so
//! concurrent writers need no coordination with each other or with the
//! state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

use crate::store::NamespaceId;
use crate::workflow::types::Stage;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error on journal {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    Approve,
    Block,
    Transition,
    Noop,
    Reset,
    AutoReset,
    ModeSet,
    Restore,
    Ungoverned,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub event: JournalEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_before: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_after: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

fn local_host() -> Option<String> {
    static HOST: OnceLock<Option<String>> = OnceLock::new();
    HOST.get_or_init(|| {
        hostname::get()
            .ok()
            .map(|name| name.to_string_lossy().into_owned())
    })
    .clone()
}

impl JournalEntry {
    pub fn new(namespace: &NamespaceId, event: JournalEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            namespace: namespace.to_string(),
            event,
            action: None,
            stage_before: None,
            stage_after: None,
            reason: None,
            token: None,
            pid: std::process::id(),
            host: local_host(),
        }
    }

    pub fn action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn stages(mut self, before: Stage, after: Stage) -> Self {
        self.stage_before = Some(before);
        self.stage_after = Some(after);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditJournal {
    path: Option<PathBuf>,
}

impl AuditJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| JournalError::Io {
            path: path.clone(),
            source,
        };

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)
    }

    /// Append, logging instead of failing.
    pub fn record(&self, entry: JournalEntry) {
        if let Err(e) = self.append(&entry) {
            warn!(
                namespace = %entry.namespace,
                event = ?entry.event,
                error = %e,
                "Failed to append audit journal entry"
            );
        }
    }

    /// Entries oldest first, optionally for one namespace, keeping the last `limit`.
    pub fn entries(
        &self,
        namespace: Option<&NamespaceId>,
        limit: Option<usize>,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        let Some(path) = &self.path else {
            return Ok(vec![]);
        };
        let contents = match crate::fs::read_optional(path) {
            Ok(Some(contents)) => contents,
            Ok(None) => return Ok(vec![]),
            Err(source) => {
                return Err(JournalError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        let mut entries: Vec<JournalEntry> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Failed to parse journal line: {}", e);
                    None
                }
            })
            .filter(|entry| namespace.map_or(true, |ns| entry.namespace == ns.as_str()))
            .collect();

        if let Some(limit) = limit {
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }
        Ok(entries)
    }
}
