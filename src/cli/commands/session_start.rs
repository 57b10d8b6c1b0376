use anyhow::Result;
use tracing::warn;

use super::{App, Command};
use crate::config::days;

/// Start-of-session housekeeping.
///
/// Makes sure the session's namespace exists, resets stale workflows
/// everywhere, and prunes old backups and cache entries. Failures in the
/// cleanup steps are logged and never fail the command.
pub struct SessionStartCommand {
    pub namespace: Option<String>,
}

impl SessionStartCommand {
    pub fn new() -> Self {
        Self { namespace: None }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Default for SessionStartCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for SessionStartCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let engine = app.engine();
        let namespace = app.namespace(self.namespace.as_deref());

        if engine.ensure_namespace(app.dispatcher.resolver(), &namespace)? {
            println!("🆕 Created workflow '{namespace}'");
        }

        match engine.sweep() {
            Ok(report) => {
                for name in &report.reset {
                    println!("🔄 Reset stale workflow '{name}'");
                }
            }
            Err(e) => warn!(error = %e, "Stale sweep failed"),
        }

        let retention = days(app.config.state.backup_retention_days);
        let mut pruned = 0;
        for ns in engine.namespaces().unwrap_or_default() {
            match engine.prune_backups(&ns, retention) {
                Ok(removed) => pruned += removed,
                Err(e) => warn!(namespace = %ns, error = %e, "Backup pruning failed"),
            }
        }

        let cleaned = app
            .cache
            .clean(days(app.config.cache.clean_after_days))
            .unwrap_or_else(|e| {
                warn!(error = %e, "Cache cleanup failed");
                0
            });

        if pruned > 0 || cleaned > 0 {
            println!("🧹 Pruned {pruned} backup(s), {cleaned} cache entr(ies)");
        }

        let state = engine.status(&namespace)?;
        println!("📍 '{namespace}' is at {}", state.stage);
        Ok(0)
    }
}
