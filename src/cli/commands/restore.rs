use anyhow::Result;
use std::path::PathBuf;

use super::{App, Command};

pub struct RestoreCommand {
    pub backup: PathBuf,
    pub namespace: Option<String>,
}

impl RestoreCommand {
    pub fn new(backup: PathBuf) -> Self {
        Self {
            backup,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Command for RestoreCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let namespace = app.namespace(self.namespace.as_deref());
        let report = app.engine().restore(&namespace, &self.backup)?;

        println!(
            "♻️  Restored '{}' from {}",
            report.namespace,
            report.restored_from.display()
        );
        println!("   {} -> {}", report.stage_before, report.stage_after);
        if let Some(path) = &report.backup {
            println!("💾 Previous record saved to {}", path.display());
        }
        Ok(0)
    }
}
