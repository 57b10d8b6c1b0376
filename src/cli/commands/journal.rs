use anyhow::Result;

use super::{App, Command};
use crate::store::NamespaceId;

/// Print recent audit journal entries as JSON lines.
pub struct JournalCommand {
    pub namespace: Option<String>,
    pub limit: usize,
}

impl JournalCommand {
    pub fn new(limit: usize) -> Self {
        Self {
            namespace: None,
            limit,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Command for JournalCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let filter = self.namespace.as_deref().and_then(NamespaceId::new);
        let journal = app.engine().journal();
        if journal.path().is_none() {
            eprintln!("Audit journal is disabled in configuration");
            return Ok(0);
        }

        for entry in journal.entries(filter.as_ref(), Some(self.limit))? {
            println!("{}", serde_json::to_string(&entry)?);
        }
        Ok(0)
    }
}
