use anyhow::Result;

use super::{App, Command};

pub struct StatusCommand {
    pub namespace: Option<String>,
    pub json: bool,
}

impl StatusCommand {
    pub fn new() -> Self {
        Self {
            namespace: None,
            json: false,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Default for StatusCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for StatusCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let namespace = app.namespace(self.namespace.as_deref());
        let state = app.engine().status(&namespace)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&state)?);
            return Ok(0);
        }

        println!("📊 WORKFLOW STATUS: {namespace}");
        println!("==========================");
        println!("   🎯 Stage: {}", state.stage);
        match state.mode {
            Some(mode) => println!("   🧭 Mode: {mode}"),
            None => println!("   🧭 Mode: unclassified"),
        }
        if let Some(active) = &state.active_action {
            println!(
                "   ⏳ In flight: {} (approved {})",
                active.action,
                active.approved_at.format("%H:%M:%S")
            );
        }
        println!("   🕒 Last updated: {}", state.last_updated.to_rfc3339());
        println!("   📜 History entries: {}", state.history.len());

        let permitted = app.engine().permitted_actions(&state);
        println!();
        if permitted.is_empty() {
            println!("🚫 Nothing is permitted until the mode is set: pipeline-gate set-mode --mode <MODE>");
        } else {
            println!("✅ Permitted next: {}", permitted.join(", "));
        }

        if let Some(checklist) = state.documentation_checklist.as_ref().filter(|_| state.documentation_pending) {
            println!();
            println!("📝 Documentation follow-up (finish with 'finish-docs'):");
            for item in &checklist.items {
                let mark = if item.done { "x" } else { " " };
                println!("   [{mark}] {}", item.name);
            }
        }
        Ok(0)
    }
}
