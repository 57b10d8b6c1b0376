use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::actions::{Action, ActionKind, ActionTable};
use super::transitions::{self, Lookup, PipelinePath};
use super::types::{
    ActiveAction, ChecklistItem, ContextKey, DocumentationChecklist, Mode, Stage, Trigger,
    WorkflowState,
};
use crate::clock::Clock;
use crate::journal::{AuditJournal, JournalEntry, JournalEvent};
use crate::store::{NamespaceId, NamespaceResolver, StateStore, StoreError};
use crate::telemetry::generate_correlation_id;

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Mode is already {current}; reset the namespace to reclassify")]
    ModeLocked { current: Mode },

    #[error("'{0}' is not a selectable mode (expected TRIVIAL, MODERATE or COMPLEX)")]
    InvalidMode(String),

    #[error("Backup {backup:?} belongs to namespace '{owner}'")]
    ForeignBackup {
        backup: std::path::PathBuf,
        owner: String,
    },
}

/// Tunables for the engine, normally built from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub stale_after: Duration,
    pub always_allowed: Vec<String>,
    pub documentation_items: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(10),
            always_allowed: Vec::new(),
            documentation_items: vec![
                "Update user-facing documentation".to_string(),
                "Record notable decisions".to_string(),
            ],
        }
    }
}

/// Outcome of a check call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub approve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Correlation token to pass back when reporting completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Stage after the decision, when the action is governed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip)]
    pub kind: Option<ActionKind>,
}

impl Decision {
    fn approved(kind: ActionKind, stage: Option<Stage>, token: Option<String>) -> Self {
        Self {
            approve: true,
            reason: None,
            token,
            stage,
            kind: Some(kind),
        }
    }

    fn blocked(kind: ActionKind, stage: Stage, reason: String) -> Self {
        Self {
            approve: false,
            reason: Some(reason),
            token: None,
            stage: Some(stage),
            kind: Some(kind),
        }
    }
}

/// Outcome of an advance call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Transitioned { from: Stage, to: Stage },
    /// State changed (context, correlation, docs) but the stage did not.
    Recorded { stage: Stage },
    Ignored { stage: Option<Stage>, reason: String },
}

enum Verdict {
    Approve { target: Option<Stage> },
    Block { reason: String },
}

/// The pipeline state machine.
///
/// Every call loads the namespace record, applies staleness recovery, makes
/// its decision and persists the result while holding the namespace lock.
pub struct WorkflowEngine {
    pub(super) store: Arc<dyn StateStore>,
    pub(super) journal: AuditJournal,
    pub(super) clock: Arc<dyn Clock>,
    actions: ActionTable,
    pub(super) settings: EngineSettings,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        journal: AuditJournal,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let actions = ActionTable::new(&settings.always_allowed);
        Self {
            store,
            journal,
            clock,
            actions,
            settings,
        }
    }

    pub fn journal(&self) -> &AuditJournal {
        &self.journal
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Decide whether `action_id` may run now.
    pub fn check(&self, namespace: &NamespaceId, action_id: &str) -> Result<Decision, GateError> {
        let action = self.actions.resolve(action_id);
        let now = self.clock.now();

        match action.kind {
            ActionKind::Ungoverned => {
                debug!(namespace = %namespace, action = %action.id, "Action is not governed by the pipeline");
                self.journal.record(
                    JournalEntry::new(namespace, JournalEvent::Ungoverned, now).action(&action.id),
                );
                return Ok(Decision::approved(action.kind, None, None));
            }
            ActionKind::AlwaysAllowed => {
                self.journal.record(
                    JournalEntry::new(namespace, JournalEvent::Approve, now)
                        .action(&action.id)
                        .reason("always allowed"),
                );
                return Ok(Decision::approved(action.kind, None, None));
            }
            _ => {}
        }

        self.with_namespace_lock(namespace, || -> Result<Decision, GateError> {
            let (mut state, _) = self.read_fresh(namespace, now)?;
            let before = state.stage;

            match self.evaluate(&state, &action) {
                Verdict::Block { reason } => {
                    info!(namespace = %namespace, action = %action.id, stage = %before, "Action blocked");
                    self.journal.record(
                        JournalEntry::new(namespace, JournalEvent::Block, now)
                            .action(&action.id)
                            .stages(before, before)
                            .reason(reason.clone()),
                    );
                    Ok(Decision::blocked(action.kind, before, reason))
                }
                Verdict::Approve { target } => {
                    let token = generate_correlation_id();
                    let after = target.unwrap_or(before);

                    state.active_action = Some(ActiveAction {
                        action: action.id.clone(),
                        token: token.clone(),
                        approved_at: now,
                    });
                    if action.kind == ActionKind::Complete {
                        self.raise_documentation_checklist(&mut state, &action.id, now);
                    }
                    state.record(&action.id, after, Trigger::OnApproval, None, Some(token.clone()), now);
                    self.store.save(namespace, &state)?;

                    info!(
                        namespace = %namespace,
                        action = %action.id,
                        stage_before = %before,
                        stage_after = %after,
                        "Action approved"
                    );
                    self.journal.record(
                        JournalEntry::new(namespace, JournalEvent::Approve, now)
                            .action(&action.id)
                            .stages(before, after)
                            .token(Some(&token)),
                    );
                    if after != before {
                        self.journal.record(
                            JournalEntry::new(namespace, JournalEvent::Transition, now)
                                .action(&action.id)
                                .stages(before, after)
                                .reason(Trigger::OnApproval.to_string())
                                .token(Some(&token)),
                        );
                    }
                    Ok(Decision::approved(action.kind, Some(after), Some(token)))
                }
            }
        })
    }

    /// Record that `action_id` finished, applying completion transitions.
    pub fn advance(
        &self,
        namespace: &NamespaceId,
        action_id: &str,
        token: Option<&str>,
        payload: Option<&Value>,
    ) -> Result<AdvanceOutcome, GateError> {
        let action = self.actions.resolve(action_id);
        let now = self.clock.now();

        if matches!(action.kind, ActionKind::Ungoverned | ActionKind::AlwaysAllowed) {
            return Ok(AdvanceOutcome::Ignored {
                stage: None,
                reason: format!("'{}' is not governed by the pipeline", action.id),
            });
        }

        self.with_namespace_lock(namespace, || -> Result<AdvanceOutcome, GateError> {
            let (mut state, _) = self.read_fresh(namespace, now)?;
            let before = state.stage;
            let mut changed = self.settle_active_action(namespace, &mut state, &action, token, now);
            let mut transitioned_to = None;

            if action.kind == ActionKind::FinishDocs {
                if state.documentation_pending {
                    state.documentation_pending = false;
                    state.documentation_checklist = None;
                    changed = true;
                }
            } else if let Lookup::Permitted(rule) =
                transitions::lookup(before, action.kind, PipelinePath::for_mode(state.mode))
            {
                if let Some(key) = context_key_for(action.kind) {
                    if let Some(text) = extract_context(payload, key) {
                        state.context.append(key, &text);
                        changed = true;
                    }
                }

                if let Some(target) = rule.on_completion {
                    let mut reason = None;
                    if action.kind == ActionKind::Classify {
                        let mode = extract_mode(payload);
                        if mode == Mode::Pending {
                            warn!(
                                namespace = %namespace,
                                action = %action.id,
                                "Classification carried no valid mode, recording PENDING"
                            );
                        }
                        state.mode = Some(mode);
                        reason = Some(format!("mode {mode}"));
                    }
                    state.record(&action.id, target, Trigger::OnCompletion, reason, token.map(str::to_string), now);
                    transitioned_to = Some(target);
                    changed = true;
                }
            }

            if !changed {
                debug!(namespace = %namespace, action = %action.id, stage = %before, "No completion rule matched");
                self.journal.record(
                    JournalEntry::new(namespace, JournalEvent::Noop, now)
                        .action(&action.id)
                        .stages(before, before)
                        .token(token),
                );
                return Ok(AdvanceOutcome::Ignored {
                    stage: Some(before),
                    reason: format!("no completion rule for '{}' in {}", action.id, before),
                });
            }

            state.last_updated = now;
            self.store.save(namespace, &state)?;

            match transitioned_to {
                Some(after) => {
                    info!(namespace = %namespace, action = %action.id, stage_before = %before, stage_after = %after, "Completion advanced stage");
                    self.journal.record(
                        JournalEntry::new(namespace, JournalEvent::Transition, now)
                            .action(&action.id)
                            .stages(before, after)
                            .reason(Trigger::OnCompletion.to_string())
                            .token(token),
                    );
                    Ok(AdvanceOutcome::Transitioned { from: before, to: after })
                }
                None => Ok(AdvanceOutcome::Recorded { stage: before }),
            }
        })
    }

    /// Resolve a `PENDING` (or never-set) mode out of band.
    pub fn set_mode(&self, namespace: &NamespaceId, mode: Mode) -> Result<WorkflowState, GateError> {
        if mode == Mode::Pending {
            return Err(GateError::InvalidMode(mode.to_string()));
        }
        let now = self.clock.now();

        self.with_namespace_lock(namespace, || -> Result<WorkflowState, GateError> {
            let (mut state, _) = self.read_fresh(namespace, now)?;
            if let Some(current) = state.mode.filter(|m| *m != Mode::Pending) {
                return Err(GateError::ModeLocked { current });
            }

            state.mode = Some(mode);
            let stage = state.stage;
            state.record("set-mode", stage, Trigger::ModeOverride, Some(format!("mode {mode}")), None, now);
            self.store.save(namespace, &state)?;

            info!(namespace = %namespace, mode = %mode, "Mode resolved out of band");
            self.journal.record(
                JournalEntry::new(namespace, JournalEvent::ModeSet, now)
                    .action("set-mode")
                    .stages(stage, stage)
                    .reason(format!("mode {mode}")),
            );
            Ok(state)
        })
    }

    /// Current record after staleness recovery.
    pub fn status(&self, namespace: &NamespaceId) -> Result<WorkflowState, GateError> {
        let now = self.clock.now();
        self.with_namespace_lock(namespace, || -> Result<WorkflowState, GateError> {
            Ok(self.read_fresh(namespace, now)?.0)
        })
    }

    pub fn ensure_namespace(
        &self,
        resolver: &NamespaceResolver,
        namespace: &NamespaceId,
    ) -> Result<bool, GateError> {
        Ok(resolver.ensure_exists(self.store.as_ref(), namespace, self.clock.now())?)
    }

    pub fn namespaces(&self) -> Result<Vec<NamespaceId>, GateError> {
        Ok(self.store.list()?)
    }

    /// Actions that would be accepted right now, as display ids.
    pub fn permitted_actions(&self, state: &WorkflowState) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> =
            transitions::permitted_kinds(state.stage, PipelinePath::for_mode(state.mode))
                .into_iter()
                .map(|kind| kind.display_id())
                .collect();
        if state.documentation_pending {
            ids.push(ActionKind::FinishDocs.display_id());
        }
        ids
    }

    pub(super) fn with_namespace_lock<T>(
        &self,
        namespace: &NamespaceId,
        f: impl FnOnce() -> T,
    ) -> T {
        match self.store.lock_path(namespace) {
            Some(lock_path) => crate::fs::with_exclusive_lock(&lock_path, f),
            None => f(),
        }
    }

    /// Load the record, substituting `INITIAL` for absent or corrupt state,
    /// and reset it first if it has gone stale. Must run under the namespace
    /// lock. The flag reports whether a stale reset happened.
    pub(super) fn read_fresh(
        &self,
        namespace: &NamespaceId,
        now: DateTime<Utc>,
    ) -> Result<(WorkflowState, bool), GateError> {
        let Some(mut state) = self.load_usable(namespace, now)? else {
            return Ok((WorkflowState::new(namespace.as_str(), now), false));
        };

        if !state.is_stale(now, self.settings.stale_after) {
            return Ok((state, false));
        }

        let before = state.stage;
        let reason = format!(
            "no activity since {} (threshold {} min)",
            state.last_updated.to_rfc3339(),
            self.settings.stale_after.num_minutes()
        );
        let backup = self.store.backup(namespace, &state)?;
        super::recovery::apply_reset(&mut state, Trigger::AutoResetStale, &reason, now);
        self.store.save(namespace, &state)?;

        warn!(namespace = %namespace, stage_before = %before, backup = ?backup, "Stale workflow reset to INITIAL");
        self.journal.record(
            JournalEntry::new(namespace, JournalEvent::AutoReset, now)
                .action("reset")
                .stages(before, Stage::Initial)
                .reason(reason),
        );
        Ok((state, true))
    }

    /// `Ok(None)` when there is no usable persisted record.
    pub(super) fn load_usable(
        &self,
        namespace: &NamespaceId,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkflowState>, GateError> {
        match self.store.load(namespace) {
            Ok(state) => Ok(state),
            Err(StoreError::Corrupt {
                reason,
                quarantined,
                ..
            }) => {
                warn!(
                    namespace = %namespace,
                    reason = %reason,
                    quarantined = ?quarantined,
                    "Corrupt state record, continuing from INITIAL"
                );
                self.journal.record(
                    JournalEntry::new(namespace, JournalEvent::Error, now)
                        .reason(format!("corrupt state: {reason}")),
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn evaluate(&self, state: &WorkflowState, action: &Action) -> Verdict {
        if action.kind == ActionKind::FinishDocs {
            return if state.documentation_pending {
                Verdict::Approve { target: None }
            } else {
                Verdict::Block {
                    reason: "No documentation follow-up is pending for this workflow.".to_string(),
                }
            };
        }

        let path = PipelinePath::for_mode(state.mode);
        match transitions::lookup(state.stage, action.kind, path) {
            Lookup::Permitted(rule) => Verdict::Approve {
                target: rule.on_approval,
            },
            Lookup::AwaitingMode(_) => Verdict::Block {
                reason: format!(
                    "'{}' needs a resolved mode, but classification recorded PENDING. \
                     Resolve it with `pipeline-gate set-mode --mode <TRIVIAL|MODERATE|COMPLEX>`.",
                    action.id
                ),
            },
            Lookup::WrongPath(_) | Lookup::NotInStage => {
                let permitted = self.permitted_actions(state);
                let mode = state.mode.map(|m| m.to_string()).unwrap_or_else(|| "unclassified".to_string());
                let reason = if path == PipelinePath::Unresolved {
                    format!(
                        "'{}' is not permitted while the workflow is {} ({}). Classification recorded PENDING; \
                         resolve it with `pipeline-gate set-mode --mode <TRIVIAL|MODERATE|COMPLEX>`.",
                        action.id, state.stage, mode
                    )
                } else if permitted.is_empty() {
                    format!(
                        "'{}' is not permitted while the workflow is {} ({}); no action is permitted in this stage.",
                        action.id, state.stage, mode
                    )
                } else {
                    format!(
                        "'{}' is not permitted while the workflow is {} ({}). Permitted now: {}.",
                        action.id,
                        state.stage,
                        mode,
                        permitted.join(", ")
                    )
                };
                Verdict::Block { reason }
            }
        }
    }

    /// Clear the in-flight marker when the completion matches it.
    fn settle_active_action(
        &self,
        namespace: &NamespaceId,
        state: &mut WorkflowState,
        action: &Action,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(active) = &state.active_action else {
            return false;
        };
        let matches = match token {
            Some(token) => active.token == token,
            None => active.action == action.id,
        };
        if matches {
            state.active_action = None;
            return true;
        }
        if token.is_some() {
            debug!(
                namespace = %namespace,
                action = %action.id,
                active = %active.action,
                "Completion token does not match the active action"
            );
            self.journal.record(
                JournalEntry::new(namespace, JournalEvent::Noop, now)
                    .action(&action.id)
                    .reason(format!("token does not match active action '{}'", active.action))
                    .token(token),
            );
        }
        false
    }

    fn raise_documentation_checklist(&self, state: &mut WorkflowState, action_id: &str, now: DateTime<Utc>) {
        state.documentation_pending = true;
        state.documentation_checklist = Some(DocumentationChecklist {
            raised_at: now,
            raised_by: action_id.to_string(),
            items: self
                .settings
                .documentation_items
                .iter()
                .map(|name| ChecklistItem {
                    name: name.clone(),
                    done: false,
                })
                .collect(),
        });
    }
}

fn context_key_for(kind: ActionKind) -> Option<ContextKey> {
    match kind {
        ActionKind::StartGathering | ActionKind::Gather => Some(ContextKey::Gathered),
        ActionKind::StartRefining | ActionKind::Refine => Some(ContextKey::Refined),
        ActionKind::StartPlanning | ActionKind::StartExecution => Some(ContextKey::Plan),
        _ => None,
    }
}

fn extract_context(payload: Option<&Value>, key: ContextKey) -> Option<String> {
    let text = match payload? {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => map
            .get("context")
            .or_else(|| map.get(key.as_str()))
            .and_then(Value::as_str),
        _ => None,
    }?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn extract_mode(payload: Option<&Value>) -> Mode {
    payload
        .and_then(|p| p.get("mode"))
        .and_then(Value::as_str)
        .and_then(Mode::parse_selectable)
        .unwrap_or(Mode::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{FileStateStore, MockStateStore};
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        engine: WorkflowEngine,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let engine = WorkflowEngine::new(
            Arc::new(FileStateStore::new(dir.path())),
            AuditJournal::new(dir.path().join("journal.jsonl")),
            clock.clone(),
            EngineSettings::default(),
        );
        Harness {
            _dir: dir,
            clock,
            engine,
        }
    }

    fn ns(raw: &str) -> NamespaceId {
        NamespaceId::new(raw).unwrap()
    }

    #[test]
    fn start_gathering_on_fresh_namespace_advances_on_approval() {
        let h = harness();
        let decision = h.engine.check(&ns("fresh"), "start-gathering").unwrap();

        assert!(decision.approve);
        assert!(decision.token.is_some());
        assert_eq!(decision.stage, Some(Stage::Gathering));

        let state = h.engine.status(&ns("fresh")).unwrap();
        assert_eq!(state.stage, Stage::Gathering);
        let entry = state.history.last().unwrap();
        assert_eq!(entry.trigger, Trigger::OnApproval);
        assert_eq!(entry.stage_before, Stage::Initial);
        assert_eq!(state.active_action.as_ref().unwrap().action, "start-gathering");
    }

    #[test]
    fn blocked_action_names_permitted_actions_and_keeps_stage() {
        let h = harness();
        h.engine.check(&ns("p"), "start-gathering").unwrap();
        let history_len = h.engine.status(&ns("p")).unwrap().history.len();

        let decision = h.engine.check(&ns("p"), "start-execution").unwrap();
        assert!(!decision.approve);
        let reason = decision.reason.unwrap();
        assert!(reason.contains("GATHERING"));
        assert!(reason.contains("start-refining"));
        assert!(reason.contains("gather:*"));

        let state = h.engine.status(&ns("p")).unwrap();
        assert_eq!(state.stage, Stage::Gathering);
        assert_eq!(state.history.len(), history_len);
    }

    #[test]
    fn classify_completion_records_mode() {
        let h = harness();
        let outcome = h
            .engine
            .advance(&ns("c"), "classify", None, Some(&json!({"mode": "TRIVIAL"})))
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Transitioned {
                from: Stage::Initial,
                to: Stage::Classified
            }
        );
        let state = h.engine.status(&ns("c")).unwrap();
        assert_eq!(state.mode, Some(Mode::Trivial));
        assert_eq!(state.history.last().unwrap().trigger, Trigger::OnCompletion);
    }

    #[test]
    fn invalid_mode_defaults_to_pending_and_gates_transitions() {
        let h = harness();
        h.engine
            .advance(&ns("c"), "classify", None, Some(&json!({"mode": "enormous"})))
            .unwrap();
        assert_eq!(h.engine.status(&ns("c")).unwrap().mode, Some(Mode::Pending));

        let decision = h.engine.check(&ns("c"), "start-gathering").unwrap();
        assert!(!decision.approve);
        assert!(decision.reason.unwrap().contains("set-mode"));

        h.engine.set_mode(&ns("c"), Mode::Moderate).unwrap();
        assert!(h.engine.check(&ns("c"), "start-gathering").unwrap().approve);
    }

    #[test]
    fn out_of_stage_action_under_pending_mode_points_at_set_mode() {
        let h = harness();
        h.engine.advance(&ns("c"), "classify", None, Some(&json!({}))).unwrap();

        let decision = h.engine.check(&ns("c"), "execute:edit").unwrap();
        assert!(!decision.approve);
        let reason = decision.reason.unwrap();
        assert!(reason.contains("set-mode --mode"), "reason was: {reason}");
        assert!(!reason.contains("no action is permitted"));
    }

    #[test]
    fn mode_cannot_be_changed_once_resolved() {
        let h = harness();
        h.engine
            .advance(&ns("c"), "classify", None, Some(&json!({"mode": "COMPLEX"})))
            .unwrap();
        assert!(matches!(
            h.engine.set_mode(&ns("c"), Mode::Trivial),
            Err(GateError::ModeLocked { current: Mode::Complex })
        ));
        assert!(matches!(
            h.engine.set_mode(&ns("c"), Mode::Pending),
            Err(GateError::InvalidMode(_))
        ));
    }

    #[test]
    fn trivial_path_executes_directly_after_classification() {
        let h = harness();
        let n = ns("t");
        h.engine.advance(&n, "classify", None, Some(&json!({"mode": "trivial"}))).unwrap();
        assert!(!h.engine.check(&n, "start-gathering").unwrap().approve);

        let decision = h.engine.check(&n, "start-execution").unwrap();
        assert!(decision.approve);
        assert_eq!(decision.stage, Some(Stage::Classified));

        h.engine
            .advance(&n, "start-execution", decision.token.as_deref(), None)
            .unwrap();
        let state = h.engine.status(&n).unwrap();
        assert_eq!(state.stage, Stage::Executing);
        assert!(state.active_action.is_none());
    }

    #[test]
    fn full_path_walks_every_stage_and_raises_docs_checklist() {
        let h = harness();
        let n = ns("full");
        for action in ["start-gathering", "gather:git", "start-refining", "refine:think", "start-planning"] {
            assert!(h.engine.check(&n, action).unwrap().approve, "{action} should be approved");
        }
        assert_eq!(h.engine.status(&n).unwrap().stage, Stage::PlanningActive);

        // Planning may enqueue more gathering before execution starts.
        assert!(h.engine.check(&n, "gather:docs").unwrap().approve);

        let exec = h.engine.check(&n, "start-execution").unwrap();
        assert_eq!(exec.stage, Some(Stage::PlanningActive));
        h.engine
            .advance(&n, "start-execution", exec.token.as_deref(), Some(&json!({"plan": "1. edit 2. test"})))
            .unwrap();

        let state = h.engine.status(&n).unwrap();
        assert_eq!(state.stage, Stage::Executing);
        assert_eq!(state.context.get(ContextKey::Plan), Some("1. edit 2. test"));

        assert!(h.engine.check(&n, "execute:edit").unwrap().approve);
        assert!(h.engine.check(&n, "complete").unwrap().approve);

        let state = h.engine.status(&n).unwrap();
        assert_eq!(state.stage, Stage::Complete);
        assert!(state.documentation_pending);
        assert_eq!(
            state.documentation_checklist.unwrap().items.len(),
            EngineSettings::default().documentation_items.len()
        );

        assert!(h.engine.check(&n, "finish-docs").unwrap().approve);
        h.engine.advance(&n, "finish-docs", None, None).unwrap();
        assert!(!h.engine.status(&n).unwrap().documentation_pending);
    }

    #[test]
    fn full_path_requires_refinement_before_planning() {
        let h = harness();
        let n = ns("strict");
        h.engine.check(&n, "start-gathering").unwrap();
        let decision = h.engine.check(&n, "start-planning").unwrap();
        assert!(!decision.approve);

        let h2 = harness();
        let m = ns("moderate");
        h2.engine.advance(&m, "classify", None, Some(&json!({"mode": "MODERATE"}))).unwrap();
        h2.engine.check(&m, "start-gathering").unwrap();
        assert!(h2.engine.check(&m, "start-planning").unwrap().approve);
    }

    #[test]
    fn completion_without_rule_is_a_silent_noop() {
        let h = harness();
        let n = ns("noop");
        h.engine.check(&n, "start-gathering").unwrap();
        h.engine.advance(&n, "start-gathering", None, None).unwrap();
        let before = h.engine.status(&n).unwrap();

        let outcome = h.engine.advance(&n, "execute:edit", None, None).unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Ignored { .. }));

        let after = h.engine.status(&n).unwrap();
        assert_eq!(after.stage, before.stage);
        assert_eq!(after.history.len(), before.history.len());
    }

    #[test]
    fn gathered_context_is_captured_on_completion() {
        let h = harness();
        let n = ns("ctx");
        let d = h.engine.check(&n, "gather:git").unwrap();
        assert!(!d.approve);
        let outcome = h
            .engine
            .advance(&n, "gather:git", None, Some(&json!({"context": "three recent commits"})))
            .unwrap();
        assert_eq!(outcome, AdvanceOutcome::Ignored {
            stage: Some(Stage::Initial),
            reason: "no completion rule for 'gather:git' in INITIAL".to_string(),
        });

        h.engine.check(&n, "start-gathering").unwrap();
        let d = h.engine.check(&n, "gather:git").unwrap();
        let outcome = h
            .engine
            .advance(&n, "gather:git", d.token.as_deref(), Some(&json!("three recent commits")))
            .unwrap();
        assert_eq!(outcome, AdvanceOutcome::Recorded { stage: Stage::Gathering });
        assert_eq!(
            h.engine.status(&n).unwrap().context.get(ContextKey::Gathered),
            Some("three recent commits")
        );
    }

    #[test]
    fn stale_workflow_is_reset_before_decision() {
        let h = harness();
        let n = ns("stale");
        h.engine.check(&n, "start-gathering").unwrap();

        h.clock.advance(Duration::minutes(11));
        let decision = h.engine.check(&n, "start-gathering").unwrap();
        assert!(decision.approve);

        let state = h.engine.status(&n).unwrap();
        let triggers: Vec<Trigger> = state.history.iter().map(|e| e.trigger).collect();
        assert_eq!(
            triggers,
            vec![Trigger::OnApproval, Trigger::AutoResetStale, Trigger::OnApproval]
        );
        assert_eq!(state.history[1].stage_after, Stage::Initial);
        assert_eq!(state.history[2].stage_before, Stage::Initial);
        assert_eq!(h.engine.store().list_backups(&n).unwrap().len(), 1);
    }

    #[test]
    fn resting_stages_never_go_stale() {
        let h = harness();
        let n = ns("rest");
        h.engine.advance(&n, "classify", None, Some(&json!({"mode": "COMPLEX"}))).unwrap();
        h.engine.check(&n, "start-gathering").unwrap();
        h.clock.advance(Duration::minutes(5));
        assert_eq!(h.engine.status(&n).unwrap().stage, Stage::Gathering);

        let h2 = harness();
        h2.engine.check(&n, "classify").unwrap();
        h2.clock.advance(Duration::hours(3));
        assert_eq!(h2.engine.status(&n).unwrap().stage, Stage::Initial);
        assert!(h2.engine.store().list_backups(&n).unwrap().is_empty());
    }

    #[test]
    fn ungoverned_actions_are_approved_without_touching_state() {
        let h = harness();
        let decision = h.engine.check(&ns("u"), "read-file").unwrap();
        assert!(decision.approve);
        assert!(decision.stage.is_none());
        assert!(h.engine.namespaces().unwrap().is_empty());
    }

    #[test]
    fn always_allowed_bypasses_stage_checks() {
        let dir = TempDir::new().unwrap();
        let settings = EngineSettings {
            always_allowed: vec!["execute:format*".to_string()],
            ..EngineSettings::default()
        };
        let engine = WorkflowEngine::new(
            Arc::new(FileStateStore::new(dir.path())),
            AuditJournal::disabled(),
            Arc::new(ManualClock::default()),
            settings,
        );
        assert!(engine.check(&ns("a"), "execute:format-all").unwrap().approve);
        assert!(!engine.check(&ns("a"), "execute:edit").unwrap().approve);
    }

    #[test]
    fn corrupt_state_is_treated_as_initial() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        let path = store.state_path(&ns("bad"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "][").unwrap();

        let engine = WorkflowEngine::new(
            Arc::new(store),
            AuditJournal::disabled(),
            Arc::new(ManualClock::default()),
            EngineSettings::default(),
        );
        let decision = engine.check(&ns("bad"), "start-gathering").unwrap();
        assert!(decision.approve);
        assert_eq!(engine.status(&ns("bad")).unwrap().stage, Stage::Gathering);
    }

    #[test]
    fn save_failure_surfaces_as_store_error() {
        let mut store = MockStateStore::new();
        store.expect_lock_path().return_const(None);
        store.expect_load().returning(|_| Ok(None));
        store.expect_save().returning(|_, _| {
            Err(StoreError::Io {
                path: "state.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        });

        let engine = WorkflowEngine::new(
            Arc::new(store),
            AuditJournal::disabled(),
            Arc::new(ManualClock::default()),
            EngineSettings::default(),
        );
        assert!(matches!(
            engine.check(&ns("x"), "start-gathering"),
            Err(GateError::Store(StoreError::Io { .. }))
        ));
    }

    #[test]
    fn blocked_decision_never_writes() {
        let mut store = MockStateStore::new();
        store.expect_lock_path().return_const(None);
        store.expect_load().returning(|_| Ok(None));
        store.expect_save().never();

        let engine = WorkflowEngine::new(
            Arc::new(store),
            AuditJournal::disabled(),
            Arc::new(ManualClock::default()),
            EngineSettings::default(),
        );
        assert!(!engine.check(&ns("x"), "complete").unwrap().approve);
    }
}
