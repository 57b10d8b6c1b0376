use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

use commands::{
    advance::AdvanceCommand, backups::BackupsCommand, cache::CacheCommand, check::CheckCommand,
    config::ConfigCommand, context::ContextCommand, history::HistoryCommand,
    journal::JournalCommand, namespaces::NamespacesCommand, reset::ResetCommand,
    restore::RestoreCommand, session_start::SessionStartCommand, set_mode::SetModeCommand,
    status::StatusCommand, App, Command,
};

#[derive(Parser)]
#[command(name = "pipeline-gate")]
#[command(version)]
#[command(about = "Stage-gated workflow enforcement for agent hosts")]
#[command(long_about = "pipeline-gate decides whether a host action may run given the current stage of \
                       its workflow, records completions, and keeps an audit trail. Hosts call \
                       'pipeline-gate check' before an action and 'pipeline-gate advance' after it.")]
pub struct Cli {
    /// Override the state root directory
    #[arg(long, global = true, env = "PIPELINE_GATE_ROOT", help = "State root (default: $HOME/.pipeline-gate)")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decide whether an action may run (reads a JSON request from stdin unless --action is given)
    Check {
        #[arg(long, help = "Action id to check instead of reading stdin")]
        action: Option<String>,
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
    },
    /// Report that an action finished (reads a JSON request from stdin unless --action is given)
    Advance {
        #[arg(long, help = "Action id that completed instead of reading stdin")]
        action: Option<String>,
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
        #[arg(long, help = "Token returned by the matching check")]
        token: Option<String>,
        #[arg(long, help = "Result payload as JSON (plain text is accepted as a string)")]
        payload: Option<String>,
    },
    /// Back up and reset a workflow to INITIAL
    Reset {
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
        #[arg(long, default_value = "manual", help = "Reason recorded in history")]
        reason: String,
    },
    /// Reinstate a backup
    Restore {
        /// Backup file name (as listed by 'backups') or path
        backup: PathBuf,
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
    },
    /// List backups, optionally pruning old ones
    Backups {
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
        #[arg(long, help = "Delete backups older than this many days")]
        prune_days: Option<u64>,
    },
    /// Resolve a PENDING classification
    SetMode {
        #[arg(long, help = "TRIVIAL, MODERATE or COMPLEX")]
        mode: String,
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
    },
    /// Show the current stage and what may run next
    Status {
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
        #[arg(long, help = "Print the full record as JSON")]
        json: bool,
    },
    /// Show stage transition history
    History {
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
        #[arg(long, help = "Only the most recent N entries")]
        limit: Option<usize>,
        #[arg(long, help = "Print entries as JSON")]
        json: bool,
    },
    /// Print captured context (gathered, refined, plan)
    Context {
        /// Only this blob
        key: Option<String>,
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
    },
    /// List namespaces with a persisted workflow
    Namespaces,
    /// Show audit journal entries
    Journal {
        #[arg(long, help = "Only entries for this namespace")]
        namespace: Option<String>,
        #[arg(long, default_value = "20", help = "Number of most recent entries to show")]
        limit: usize,
    },
    /// Housekeeping for a new host session: stale sweep, backup and cache cleanup
    SessionStart {
        #[arg(long, help = "Namespace override")]
        namespace: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(long, help = "Also write it to this file")]
        write: Option<PathBuf>,
    },
    /// Fingerprint cache operations
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// Print the fingerprint of a directory tree
    Fingerprint { path: PathBuf },
    /// Report hit, miss or expired for a tree
    Check { path: PathBuf },
    /// Print the cached payload for a tree (exit 1 on miss)
    Get {
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "path", help = "Look up a specific fingerprint")]
        fingerprint: Option<String>,
    },
    /// Cache a payload for a tree (JSON from --payload or stdin)
    Store {
        path: PathBuf,
        #[arg(long)]
        payload: Option<String>,
    },
    /// Remove every entry for a tree
    Invalidate { path: PathBuf },
    /// Remove entries older than N days (default from configuration)
    Clean {
        #[arg(long)]
        days: Option<u64>,
    },
    /// Entry count, size and age range
    Stats,
    /// List index entries, newest first
    List,
}

impl Commands {
    /// Run the command, returning the process exit code.
    pub fn run(self, app: &App) -> anyhow::Result<u8> {
        match self {
            Commands::Check { action, namespace } => CheckCommand::new()
                .with_action(action)
                .with_namespace(namespace)
                .execute(app),
            Commands::Advance {
                action,
                namespace,
                token,
                payload,
            } => AdvanceCommand::new()
                .with_action(action)
                .with_namespace(namespace)
                .with_token(token)
                .with_payload(payload)
                .execute(app),
            Commands::Reset { namespace, reason } => ResetCommand::new(reason).with_namespace(namespace).execute(app),
            Commands::Restore { backup, namespace } => RestoreCommand::new(backup).with_namespace(namespace).execute(app),
            Commands::Backups { namespace, prune_days } => BackupsCommand::new()
                .with_namespace(namespace)
                .with_prune_days(prune_days)
                .execute(app),
            Commands::SetMode { mode, namespace } => SetModeCommand::new(mode).with_namespace(namespace).execute(app),
            Commands::Status { namespace, json } => StatusCommand::new()
                .with_namespace(namespace)
                .with_json(json)
                .execute(app),
            Commands::History { namespace, limit, json } => HistoryCommand::new()
                .with_namespace(namespace)
                .with_limit(limit)
                .with_json(json)
                .execute(app),
            Commands::Context { key, namespace } => ContextCommand::new(key).with_namespace(namespace).execute(app),
            Commands::Namespaces => NamespacesCommand.execute(app),
            Commands::Journal { namespace, limit } => JournalCommand::new(limit).with_namespace(namespace).execute(app),
            Commands::SessionStart { namespace } => SessionStartCommand::new().with_namespace(namespace).execute(app),
            Commands::Config { write } => ConfigCommand::new(write).execute(app),
            Commands::Cache { command } => CacheCommand::new(command).execute(app),
        }
    }
}
