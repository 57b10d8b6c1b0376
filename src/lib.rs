// pipeline-gate library - stage-gated workflow enforcement
// This exposes the core components for the binary and for integration tests

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod fs;
pub mod journal;
pub mod observability;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use cache::{fingerprint, CacheError, CacheStatus, ContextCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineGateConfig;
pub use dispatch::{HookDispatcher, HookOutcome};
pub use journal::{AuditJournal, JournalEntry, JournalEvent};
pub use observability::{create_workflow_span, OperationTimer};
pub use store::{FileStateStore, NamespaceId, NamespaceResolver, StateStore, StoreError};
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use workflow::{
    AdvanceOutcome, Decision, EngineSettings, GateError, Mode, Stage, Trigger, WorkflowEngine,
    WorkflowState,
};
