use anyhow::{anyhow, Result};

use super::{parse_payload, read_stdin, App, Command};
use crate::cache::{fingerprint, CacheStatus};
use crate::cli::CacheCommands;
use crate::config::days;

pub struct CacheCommand {
    pub command: CacheCommands,
}

impl CacheCommand {
    pub fn new(command: CacheCommands) -> Self {
        Self { command }
    }
}

impl Command for CacheCommand {
    fn execute(&self, app: &App) -> Result<u8> {
        let cache = &app.cache;
        match &self.command {
            CacheCommands::Fingerprint { path } => {
                println!("{}", fingerprint(path)?.hash);
            }
            CacheCommands::Check { path } => {
                let lookup = cache.check(path)?;
                println!("{}", serde_json::to_string(&lookup)?);
                if lookup.status != CacheStatus::Hit {
                    return Ok(1);
                }
            }
            CacheCommands::Get { path, fingerprint } => {
                let payload = match (path, fingerprint) {
                    (_, Some(hash)) => cache.get_by_fingerprint(hash)?,
                    (Some(path), None) => cache.get(path)?,
                    (None, None) => return Err(anyhow!("Give a path or --fingerprint")),
                };
                match payload {
                    Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
                    None => return Ok(1),
                }
            }
            CacheCommands::Store { path, payload } => {
                let raw = match payload {
                    Some(raw) => raw.clone(),
                    None => read_stdin(),
                };
                let entry = cache.store(path, parse_payload(raw.trim()))?;
                println!("{}", entry.fingerprint);
            }
            CacheCommands::Invalidate { path } => {
                let removed = cache.invalidate(path)?;
                println!("🗑️  Removed {removed} cache entr(ies) for {}", path.display());
            }
            CacheCommands::Clean { days: limit } => {
                let limit = limit.unwrap_or(app.config.cache.clean_after_days);
                let removed = cache.clean(days(limit))?;
                println!("🧹 Removed {removed} cache entr(ies) older than {limit} day(s)");
            }
            CacheCommands::Stats => {
                println!("{}", serde_json::to_string_pretty(&cache.stats()?)?);
            }
            CacheCommands::List => {
                for entry in cache.list()? {
                    println!(
                        "{}  {}  {}",
                        entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
                        &entry.fingerprint[..12.min(entry.fingerprint.len())],
                        entry.path.display()
                    );
                }
            }
        }
        Ok(0)
    }
}
