use anyhow::Result;

use super::{parse_payload, read_stdin, App, Command};
use crate::dispatch::AdvanceRequest;

/// Host-facing completion report. Always exits 0.
pub struct AdvanceCommand {
    pub action: Option<String>,
    pub namespace: Option<String>,
    pub token: Option<String>,
    pub payload: Option<String>,
}

impl AdvanceCommand {
    pub fn new() -> Self {
        Self {
            action: None,
            namespace: None,
            token: None,
            payload: None,
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

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_payload(mut self, payload: Option<String>) -> Self {
        self.payload = payload;
        self
    }
}

impl Default for AdvanceCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for AdvanceCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let response = match &self.action {
            Some(action) => app.dispatcher.advance(AdvanceRequest {
                action_id: Some(action.clone()),
                namespace: self.namespace.clone(),
                token: self.token.clone(),
                result_payload: self.payload.as_deref().map(parse_payload),
            }),
            None => app.dispatcher.advance_json(&read_stdin()),
        };
        println!("{}", serde_json::to_string(&response)?);
        Ok(0)
    }
}
