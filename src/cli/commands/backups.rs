use anyhow::Result;

use super::{App, Command};
use crate::config::days;

pub struct BackupsCommand {
    pub namespace: Option<String>,
    pub prune_days: Option<u64>,
}

impl BackupsCommand {
    pub fn new() -> Self {
        Self {
            namespace: None,
            prune_days: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_prune_days(mut self, prune_days: Option<u64>) -> Self {
        self.prune_days = prune_days;
        self
    }
}

impl Default for BackupsCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for BackupsCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let namespace = app.namespace(self.namespace.as_deref());

        if let Some(limit) = self.prune_days {
            let removed = app.engine().prune_backups(&namespace, days(limit))?;
            println!("🧹 Removed {removed} backup(s) older than {limit} day(s)");
        }

        let backups = app.engine().list_backups(&namespace)?;
        if backups.is_empty() {
            println!("📋 No backups for '{namespace}'");
            return Ok(0);
        }

        println!("📋 Backups for '{namespace}' (oldest first):");
        for backup in backups {
            let name = backup
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| backup.path.display().to_string());
            println!(
                "   {}  {}  {} bytes",
                backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                name,
                backup.size_bytes
            );
        }
        Ok(0)
    }
}
