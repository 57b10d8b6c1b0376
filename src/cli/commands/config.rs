use anyhow::Result;
use std::path::PathBuf;

use super::{App, Command};

pub struct ConfigCommand {
    pub write: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(write: Option<PathBuf>) -> Self {
        Self { write }
    }
}

impl Command for ConfigCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        println!("# state root: {}", app.root.display());
        print!("{}", app.config.to_toml()?);

        if let Some(path) = &self.write {
            app.config.save_to_file(path)?;
            eprintln!("💾 Configuration written to {}", path.display());
        }
        Ok(0)
    }
}
