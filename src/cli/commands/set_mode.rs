use anyhow::Result;

use super::{App, Command};
use crate::workflow::{GateError, Mode};

pub struct SetModeCommand {
    pub mode: String,
    pub namespace: Option<String>,
}

impl SetModeCommand {
    pub fn new(mode: String) -> Self {
        Self {
            mode,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

impl Command for SetModeCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let mode = Mode::parse_selectable(&self.mode).ok_or_else(|| GateError::InvalidMode(self.mode.clone()))?;
        let namespace = app.namespace(self.namespace.as_deref());
        let state = app.engine().set_mode(&namespace, mode)?;

        println!("✅ Mode for '{namespace}' set to {mode} (stage {})", state.stage);
        Ok(0)
    }
}
