//! Mapping from raw host action identifiers to pipeline categories.
//!
//! Raw ids are matched exactly once, at the boundary, and the resulting
//! [`ActionKind`] is what the transition table works with. Nothing past this
//! module looks at the string again except to record it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Classify,
    StartGathering,
    Gather,
    StartRefining,
    Refine,
    StartPlanning,
    StartExecution,
    Execute,
    Complete,
    FinishDocs,
    /// Opted in by configuration; bypasses every stage check.
    AlwaysAllowed,
    /// Not part of the pipeline at all.
    Ungoverned,
}

impl ActionKind {
    /// How the kind is written when telling a caller what would be accepted.
    pub fn display_id(&self) -> &'static str {
        match self {
            ActionKind::Classify => "classify",
            ActionKind::StartGathering => "start-gathering",
            ActionKind::Gather => "gather:*",
            ActionKind::StartRefining => "start-refining",
            ActionKind::Refine => "refine:*",
            ActionKind::StartPlanning => "start-planning",
            ActionKind::StartExecution => "start-execution",
            ActionKind::Execute => "execute:*",
            ActionKind::Complete => "complete",
            ActionKind::FinishDocs => "finish-docs",
            ActionKind::AlwaysAllowed => "<always-allowed>",
            ActionKind::Ungoverned => "<ungoverned>",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_id())
    }
}

/// An exact id or a `prefix*` pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPattern {
    Exact(String),
    Prefix(String),
}

impl ActionPattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_suffix('*') {
            Some(prefix) => ActionPattern::Prefix(prefix.to_string()),
            None => ActionPattern::Exact(raw.to_string()),
        }
    }

    pub fn matches(&self, action_id: &str) -> bool {
        match self {
            ActionPattern::Exact(id) => id == action_id,
            ActionPattern::Prefix(prefix) => action_id.starts_with(prefix.as_str()),
        }
    }
}

/// A host action id after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
}

/// Lookup table from raw ids to [`ActionKind`]
#[derive(Debug, Clone)]
pub struct ActionTable {
    entries: Vec<(ActionPattern, ActionKind)>,
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl ActionTable {
    /// Build the reference table. `always_allowed` patterns are checked
    /// first so an operator can opt a specific id out of enforcement.
    pub fn new(always_allowed: &[String]) -> Self {
        let mut entries: Vec<(ActionPattern, ActionKind)> = always_allowed
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| (ActionPattern::parse(raw), ActionKind::AlwaysAllowed))
            .collect();

        entries.extend([
            (ActionPattern::parse("classify"), ActionKind::Classify),
            (ActionPattern::parse("classify:*"), ActionKind::Classify),
            (ActionPattern::parse("start-gathering"), ActionKind::StartGathering),
            (ActionPattern::parse("gather:*"), ActionKind::Gather),
            (ActionPattern::parse("start-refining"), ActionKind::StartRefining),
            (ActionPattern::parse("refine:*"), ActionKind::Refine),
            (ActionPattern::parse("start-planning"), ActionKind::StartPlanning),
            (ActionPattern::parse("start-execution"), ActionKind::StartExecution),
            (ActionPattern::parse("execute:*"), ActionKind::Execute),
            (ActionPattern::parse("complete"), ActionKind::Complete),
            (ActionPattern::parse("finish-docs"), ActionKind::FinishDocs),
        ]);

        Self { entries }
    }

    pub fn resolve(&self, action_id: &str) -> Action {
        let id = action_id.trim();
        let kind = self
            .entries
            .iter()
            .find(|(pattern, _)| pattern.matches(id))
            .map(|(_, kind)| *kind)
            .unwrap_or(ActionKind::Ungoverned);
        Action {
            id: id.to_string(),
            kind,
        }
    }
}
