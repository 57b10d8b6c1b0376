use anyhow::{anyhow, Result};

use super::{App, Command};
use crate::workflow::ContextKey;

/// Print captured context blobs, one or all.
pub struct ContextCommand {
    pub key: Option<String>,
    pub namespace: Option<String>,
}

impl ContextCommand {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Command for ContextCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let keys = match &self.key {
            Some(raw) => vec![ContextKey::parse(raw)
                .ok_or_else(|| anyhow!("Unknown context '{raw}' (expected gathered, refined or plan)"))?],
            None => ContextKey::ALL.to_vec(),
        };

        let namespace = app.namespace(self.namespace.as_deref());
        let state = app.engine().status(&namespace)?;

        if let [key] = keys.as_slice() {
            if let Some(text) = state.context.get(*key) {
                println!("{text}");
            }
            return Ok(0);
        }

        for key in keys {
            println!("## {}", key.as_str());
            println!("{}", state.context.get(key).unwrap_or("(empty)"));
            println!();
        }
        Ok(0)
    }
}
