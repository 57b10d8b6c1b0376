use anyhow::Result;

use super::{App, Command};

pub struct NamespacesCommand;

impl Command for NamespacesCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let namespaces = app.dispatcher.resolver().list_all(app.engine().store())?;
        if namespaces.is_empty() {
            println!("📋 No workflows recorded under {}", app.root.display());
            return Ok(0);
        }

        for namespace in namespaces {
            match app.engine().status(&namespace) {
                Ok(state) => println!(
                    "{:<24} {:<16} {}",
                    namespace.as_str(),
                    state.stage.as_str(),
                    state.last_updated.to_rfc3339()
                ),
                Err(e) => println!("{:<24} ⚠️  {e}", namespace.as_str()),
            }
        }
        Ok(0)
    }
}
