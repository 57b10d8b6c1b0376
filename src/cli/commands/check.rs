use anyhow::Result;

use super::{read_stdin, App, Command};
use crate::dispatch::CheckRequest;

/// Host-facing pre-action check. Prints the JSON response on stdout and
/// exits 0 (approve) or 2 (block).
pub struct CheckCommand {
    pub action: Option<String>,
    pub namespace: Option<String>,
}

impl CheckCommand {
    pub fn new() -> Self {
        Self {
            action: None,
            namespace: None,
        }
    }

    pub fn with_action(mut self, action: Option<String>) -> Self {
        self.action = action;
        self
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Default for CheckCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for CheckCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let (response, outcome) = match &self.action {
            Some(action) => app.dispatcher.check(CheckRequest {
                action_id: Some(action.clone()),
                namespace: self.namespace.clone(),
            }),
            None => app.dispatcher.check_json(&read_stdin()),
        };
        println!("{}", serde_json::to_string(&response)?);
        Ok(outcome.exit_code())
    }
}
