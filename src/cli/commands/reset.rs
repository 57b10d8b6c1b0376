use anyhow::Result;

use super::{App, Command};

pub struct ResetCommand {
    pub namespace: Option<String>,
    pub reason: String,
}

impl ResetCommand {
    pub fn new(reason: String) -> Self {
        Self {
            namespace: None,
            reason,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Command for ResetCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let report = app.dispatcher.reset(self.namespace.as_deref(), &self.reason)?;

        println!(
            "🔄 Reset workflow '{}' from {} to INITIAL",
            report.namespace, report.stage_before
        );
        match &report.backup {
            Some(path) => println!("💾 Backup: {}", path.display()),
            None => println!("💾 No prior record, nothing to back up"),
        }
        Ok(0)
    }
}
