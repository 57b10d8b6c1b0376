use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::workflow::EngineSettings;

/// Environment variable naming an extra configuration file.
pub const CONFIG_FILE_ENV: &str = "PIPELINE_GATE_CONFIG";

/// Main configuration structure for pipeline-gate
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineGateConfig {
    /// Where state, backups and the journal live
    pub state: StateConfig,
    /// Context cache settings
    pub cache: CacheConfig,
    /// Audit journal settings
    pub journal: JournalConfig,
    /// Enforcement policy
    pub policy: PolicyConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateConfig {
    /// State root; `$HOME/.pipeline-gate` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    /// Minutes a working stage may sit idle before it is reset
    pub stale_after_minutes: u64,
    /// Backups older than this are pruned by `session-start`
    pub backup_retention_days: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entries older than this read as misses
    pub ttl_days: u64,
    /// Entries older than this are removed by housekeeping
    pub clean_after_days: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JournalConfig {
    pub enabled: bool,
    /// File name under the state root
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyConfig {
    pub default_namespace: String,
    /// Environment variable consulted when no namespace is given
    pub namespace_env: String,
    /// Action ids (or `prefix*` patterns) that bypass stage checks
    pub always_allowed: Vec<String>,
    /// Checklist raised when a workflow completes
    pub documentation_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level when neither RUST_LOG nor PIPELINE_GATE_DEBUG is set
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json: bool,
}

impl Default for PipelineGateConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            state: StateConfig {
                root_dir: None,
                stale_after_minutes: engine.stale_after.num_minutes().unsigned_abs(),
                backup_retention_days: 30,
            },
            cache: CacheConfig {
                ttl_days: 7,
                clean_after_days: 30,
            },
            journal: JournalConfig {
                enabled: true,
                file_name: "journal.jsonl".to_string(),
            },
            policy: PolicyConfig {
                default_namespace: crate::store::namespace::DEFAULT_NAMESPACE.to_string(),
                namespace_env: "PIPELINE_GATE_NAMESPACE".to_string(),
                always_allowed: engine.always_allowed,
                documentation_items: engine.documentation_items,
            },
            observability: ObservabilityConfig {
                log_level: "warn".to_string(),
                json: false,
            },
        }
    }
}

impl PipelineGateConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `pipeline-gate.toml` in the working directory
    /// 3. The file named by `PIPELINE_GATE_CONFIG`
    /// 4. Environment variables (`PIPELINE_GATE__SECTION__KEY`)
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(Path::new("pipeline-gate.toml"), explicit.as_deref())
    }

    pub fn load_from(local: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if local.exists() {
            builder = builder.add_source(File::from(local).format(FileFormat::Toml));
        }

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PIPELINE_GATE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("policy.always_allowed")
                .with_list_parse_key("policy.documentation_items")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Configuration has invalid values")
    }

    /// Effective state root.
    pub fn root_dir(&self) -> PathBuf {
        self.state.root_dir.clone().unwrap_or_else(default_root)
    }

    pub fn journal_path(&self, root: &Path) -> Option<PathBuf> {
        self.journal
            .enabled
            .then(|| root.join(&self.journal.file_name))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            stale_after: minutes(self.state.stale_after_minutes),
            always_allowed: self.policy.always_allowed.clone(),
            documentation_items: self.policy.documentation_items.clone(),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::debug!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

fn default_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".pipeline-gate"),
        None => PathBuf::from(".pipeline-gate"),
    }
}

/// Saturates at `Duration::MAX` for counts chrono cannot represent.
pub(crate) fn minutes(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .unwrap_or(chrono::Duration::MAX)
}

/// Saturates at `Duration::MAX` for counts chrono cannot represent.
pub(crate) fn days(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_days)
        .unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn oversized_counts_saturate() {
        assert_eq!(days(30), chrono::Duration::days(30));
        assert_eq!(minutes(10), chrono::Duration::minutes(10));
        assert_eq!(days(u64::MAX), chrono::Duration::MAX);
        assert_eq!(days(100_000_000_000_000), chrono::Duration::MAX);
        assert_eq!(minutes(u64::MAX), chrono::Duration::MAX);
    }

    #[test]
    fn defaults_round_trip_through_the_builder() {
        let dir = TempDir::new().unwrap();
        let config = PipelineGateConfig::load_from(&dir.path().join("absent.toml"), None).unwrap();
        assert_eq!(config.state.stale_after_minutes, 10);
        assert_eq!(config.cache.ttl_days, 7);
        assert!(config.policy.always_allowed.is_empty());
        assert_eq!(config.policy.default_namespace, "default");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gate.toml");
        std::fs::write(
            &path,
            r#"
[state]
root_dir = "/var/lib/gate"
stale_after_minutes = 45

[policy]
always_allowed = ["execute:lint*"]
"#,
        )
        .unwrap();

        let config = PipelineGateConfig::load_from(&dir.path().join("absent.toml"), Some(&path)).unwrap();
        assert_eq!(config.root_dir(), PathBuf::from("/var/lib/gate"));
        assert_eq!(config.engine_settings().stale_after, chrono::Duration::minutes(45));
        assert_eq!(config.policy.always_allowed, vec!["execute:lint*".to_string()]);
        assert_eq!(config.cache.ttl_days, 7);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gate.toml");
        std::fs::write(&path, "[state\nstale_after_minutes = ").unwrap();
        assert!(PipelineGateConfig::load_from(&dir.path().join("absent.toml"), Some(&path)).is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = PipelineGateConfig::default();
        config.journal.enabled = false;
        config.save_to_file(&path).unwrap();

        let loaded = PipelineGateConfig::load_from(&dir.path().join("absent.toml"), Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.journal_path(Path::new("/tmp")).is_none());
    }
}
