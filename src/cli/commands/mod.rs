use anyhow::Result;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::ContextCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{days, PipelineGateConfig};
use crate::dispatch::HookDispatcher;
use crate::journal::AuditJournal;
use crate::store::{FileStateStore, NamespaceId, NamespaceResolver};
use crate::workflow::WorkflowEngine;

pub mod advance;
pub mod backups;
pub mod cache;
pub mod check;
pub mod config;
pub mod context;
pub mod history;
pub mod journal;
pub mod namespaces;
pub mod reset;
pub mod restore;
pub mod session_start;
pub mod set_mode;
pub mod status;

pub trait Command {
    /// Run and return the process exit code.
    fn execute(&self, app: &App) -> Result<u8>;
}

/// Everything a command needs, wired from configuration
pub struct App {
    pub config: PipelineGateConfig,
    pub root: PathBuf,
    pub dispatcher: HookDispatcher,
    pub cache: ContextCache,
}

impl App {
    pub fn build(config: PipelineGateConfig, root_override: Option<PathBuf>) -> Self {
        let root = root_override.unwrap_or_else(|| config.root_dir());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let journal = match config.journal_path(&root) {
            Some(path) => AuditJournal::new(path),
            None => AuditJournal::disabled(),
        };
        let engine = WorkflowEngine::new(
            Arc::new(FileStateStore::new(&root)),
            journal,
            clock.clone(),
            config.engine_settings(),
        );
        let resolver = NamespaceResolver::new(&config.policy.default_namespace, &config.policy.namespace_env);
        let cache = ContextCache::new(root.join("cache"), days(config.cache.ttl_days), clock);

        Self {
            root,
            dispatcher: HookDispatcher::new(engine, resolver),
            cache,
            config,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        self.dispatcher.engine()
    }

    pub fn namespace(&self, explicit: Option<&str>) -> NamespaceId {
        self.dispatcher.namespace(explicit)
    }
}

/// Whole of stdin, empty when it cannot be read.
pub(crate) fn read_stdin() -> String {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        tracing::warn!(error = %e, "Failed to read stdin");
        input.clear();
    }
    input
}

/// JSON if it parses, otherwise the raw text as a JSON string.
pub(crate) fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
