//! Pipeline stages, the transition table and the engine that enforces it.

pub mod actions;
pub mod engine;
pub mod recovery;
pub mod transitions;
pub mod types;

pub use actions::{Action, ActionKind, ActionTable};
pub use engine::{AdvanceOutcome, Decision, EngineSettings, GateError, WorkflowEngine};
pub use recovery::{ResetReport, RestoreReport, SweepReport};
pub use transitions::PipelinePath;
pub use types::{ContextKey, Mode, Stage, Trigger, WorkflowState};
