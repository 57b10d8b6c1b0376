use anyhow::Result;

use super::{App, Command};

pub struct HistoryCommand {
    pub namespace: Option<String>,
    pub limit: Option<usize>,
    pub json: bool,
}

impl HistoryCommand {
    pub fn new() -> Self {
        Self {
            namespace: None,
            limit: None,
            json: false,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Default for HistoryCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for HistoryCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let namespace = app.namespace(self.namespace.as_deref());
        let state = app.engine().status(&namespace)?;
        let skip = self
            .limit
            .map_or(0, |limit| state.history.len().saturating_sub(limit));
        let entries = &state.history[skip..];

        if self.json {
            println!("{}", serde_json::to_string_pretty(entries)?);
            return Ok(0);
        }

        if entries.is_empty() {
            println!("📜 No history for '{namespace}'");
            return Ok(0);
        }
        for entry in entries {
            let reason = entry
                .reason
                .as_deref()
                .map(|r| format!("  ({r})"))
                .unwrap_or_default();
            println!(
                "{}  {:<16} {:>15} -> {:<15} {}{}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.action,
                entry.stage_before.as_str(),
                entry.stage_after.as_str(),
                entry.trigger,
                reason
            );
        }
        Ok(0)
    }
}
