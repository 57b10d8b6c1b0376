use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a workflow in the pipeline.
///
/// Deserialization never fails: an unrecognised stage name is read back as
/// [`Stage::Initial`] so that a hand-edited or future-format record cannot
/// wedge the enforcement path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum Stage {
    Initial,
    Classified,
    Gathering,
    Refining,
    PlanningActive,
    Executing,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Initial,
        Stage::Classified,
        Stage::Gathering,
        Stage::Refining,
        Stage::PlanningActive,
        Stage::Executing,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "INITIAL",
            Stage::Classified => "CLASSIFIED",
            Stage::Gathering => "GATHERING",
            Stage::Refining => "REFINING",
            Stage::PlanningActive => "PLANNING_ACTIVE",
            Stage::Executing => "EXECUTING",
            Stage::Complete => "COMPLETE",
        }
    }

    pub fn parse(raw: &str) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    /// Entry and exit points are never considered stale.
    pub fn is_resting(&self) -> bool {
        matches!(self, Stage::Initial | Stage::Complete)
    }
}

impl From<String> for Stage {
    fn from(raw: String) -> Self {
        Stage::parse(&raw).unwrap_or_else(|| {
            tracing::warn!(stage = %raw, "Unknown stage in persisted state, treating as INITIAL");
            Stage::Initial
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complexity classification chosen early in a workflow.
///
/// `Pending` is the sentinel recorded when classification produced no usable
/// value; mode-gated transitions stay blocked until it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum Mode {
    Trivial,
    Moderate,
    Complex,
    Pending,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Trivial => "TRIVIAL",
            Mode::Moderate => "MODERATE",
            Mode::Complex => "COMPLEX",
            Mode::Pending => "PENDING",
        }
    }

    /// Parse one of the selectable modes. `PENDING` is not selectable.
    pub fn parse_selectable(raw: &str) -> Option<Mode> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "TRIVIAL" => Some(Mode::Trivial),
            "MODERATE" => Some(Mode::Moderate),
            "COMPLEX" => Some(Mode::Complex),
            _ => None,
        }
    }
}

impl From<String> for Mode {
    fn from(raw: String) -> Self {
        Mode::parse_selectable(&raw).unwrap_or(Mode::Pending)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a history entry to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    OnApproval,
    OnCompletion,
    AutoResetStale,
    ManualReset,
    ModeOverride,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::OnApproval => "on_approval",
            Trigger::OnCompletion => "on_completion",
            Trigger::AutoResetStale => "auto_reset_stale",
            Trigger::ManualReset => "manual_reset",
            Trigger::ModeOverride => "mode_override",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub stage_before: Stage,
    pub stage_after: Stage,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// The action approved most recently and not yet reported complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAction {
    pub action: String,
    pub token: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKey {
    Gathered,
    Refined,
    Plan,
}

impl ContextKey {
    pub const ALL: [ContextKey; 3] = [ContextKey::Gathered, ContextKey::Refined, ContextKey::Plan];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::Gathered => "gathered",
            ContextKey::Refined => "refined",
            ContextKey::Plan => "plan",
        }
    }

    pub fn parse(raw: &str) -> Option<ContextKey> {
        ContextKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

/// Free-form text accumulated by specific stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlobs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gathered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

impl ContextBlobs {
    pub fn get(&self, key: ContextKey) -> Option<&str> {
        match key {
            ContextKey::Gathered => self.gathered.as_deref(),
            ContextKey::Refined => self.refined.as_deref(),
            ContextKey::Plan => self.plan.as_deref(),
        }
    }

    /// Append text to a blob; earlier text is kept.
    pub fn append(&mut self, key: ContextKey, text: &str) {
        let slot = match key {
            ContextKey::Gathered => &mut self.gathered,
            ContextKey::Refined => &mut self.refined,
            ContextKey::Plan => &mut self.plan,
        };
        match slot {
            Some(existing) => {
                existing.push_str("\n\n");
                existing.push_str(text);
            }
            None => *slot = Some(text.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gathered.is_none() && self.refined.is_none() && self.plan.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub name: String,
    #[serde(default)]
    pub done: bool,
}

/// Follow-up obligations raised when a workflow is marked complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationChecklist {
    pub raised_at: DateTime<Utc>,
    pub raised_by: String,
    pub items: Vec<ChecklistItem>,
}

/// The single mutable record kept per namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub namespace: String,
    #[serde(default = "initial_stage")]
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_action: Option<ActiveAction>,
    #[serde(default, rename = "contextBlobs")]
    pub context: ContextBlobs,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub documentation_pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_checklist: Option<DocumentationChecklist>,
}

fn initial_stage() -> Stage {
    Stage::Initial
}

impl WorkflowState {
    pub fn new(namespace: &str, now: DateTime<Utc>) -> Self {
        Self {
            namespace: namespace.to_string(),
            stage: Stage::Initial,
            mode: None,
            active_action: None,
            context: ContextBlobs::default(),
            history: Vec::new(),
            created_at: now,
            last_updated: now,
            documentation_pending: false,
            documentation_checklist: None,
        }
    }

    /// True when the workflow has sat in a working stage longer than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        !self.stage.is_resting() && now - self.last_updated > threshold
    }

    /// Record a stage change (or a no-change decision) in history.
    pub fn record(
        &mut self,
        action: &str,
        stage_after: Stage,
        trigger: Trigger,
        reason: Option<String>,
        token: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.history.push(HistoryEntry {
            action: action.to_string(),
            timestamp: now,
            stage_before: self.stage,
            stage_after,
            trigger,
            reason,
            token,
        });
        self.stage = stage_after;
        self.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stage_deserializes_as_initial() {
        let stage: Stage = serde_json::from_str("\"DEPLOYING\"").unwrap();
        assert_eq!(stage, Stage::Initial);

        let stage: Stage = serde_json::from_str("\"PLANNING_ACTIVE\"").unwrap();
        assert_eq!(stage, Stage::PlanningActive);
    }

    #[test]
    fn stage_serializes_in_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Stage::PlanningActive).unwrap(),
            "\"PLANNING_ACTIVE\""
        );
    }

    #[test]
    fn invalid_mode_deserializes_as_pending() {
        let mode: Mode = serde_json::from_str("\"SUPER_HARD\"").unwrap();
        assert_eq!(mode, Mode::Pending);
        let mode: Mode = serde_json::from_str("\"trivial\"").unwrap();
        assert_eq!(mode, Mode::Trivial);
    }

    #[test]
    fn context_blobs_append_keeps_earlier_text() {
        let mut blobs = ContextBlobs::default();
        blobs.append(ContextKey::Gathered, "git history");
        blobs.append(ContextKey::Gathered, "symbol index");
        assert_eq!(blobs.get(ContextKey::Gathered), Some("git history\n\nsymbol index"));
        assert!(blobs.get(ContextKey::Plan).is_none());
    }

    #[test]
    fn staleness_ignores_resting_stages() {
        let now = Utc::now();
        let mut state = WorkflowState::new("ns", now - chrono::Duration::hours(2));
        let threshold = chrono::Duration::minutes(10);
        assert!(!state.is_stale(now, threshold));

        state.stage = Stage::Gathering;
        assert!(state.is_stale(now, threshold));

        state.stage = Stage::Complete;
        assert!(!state.is_stale(now, threshold));
    }

    #[test]
    fn partial_record_fills_defaults() {
        let raw = r#"{
            "namespace": "legacy",
            "stage": "EXECUTING",
            "createdAt": "2026-01-01T00:00:00Z",
            "lastUpdated": "2026-01-01T00:00:00Z"
        }"#;
        let state: WorkflowState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.stage, Stage::Executing);
        assert!(state.history.is_empty());
        assert!(state.context.is_empty());
        assert!(!state.documentation_pending);
    }
}
