//! The reference transition table.
//!
//! A rule says: in `stage`, an action of `kind` is permitted when the
//! workflow's path satisfies `guard`. Approval may move the stage right away
//! (`on_approval`), or the move may wait for the completion report
//! (`on_completion`). Rules with neither just permit the action.

use super::actions::ActionKind;
use super::types::{Mode, Stage};

/// Which route through the pipeline a workflow takes, derived from its mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePath {
    /// Classified trivial: straight to execution.
    Direct,
    /// Refinement optional.
    Standard,
    /// Every stage required. Also used before classification.
    Full,
    /// Classification produced no usable mode.
    Unresolved,
}

impl PipelinePath {
    pub fn for_mode(mode: Option<Mode>) -> Self {
        match mode {
            None | Some(Mode::Complex) => PipelinePath::Full,
            Some(Mode::Moderate) => PipelinePath::Standard,
            Some(Mode::Trivial) => PipelinePath::Direct,
            Some(Mode::Pending) => PipelinePath::Unresolved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeGuard {
    Any,
    Paths(&'static [PipelinePath]),
}

impl ModeGuard {
    fn admits(&self, path: PipelinePath) -> bool {
        match self {
            ModeGuard::Any => true,
            ModeGuard::Paths(paths) => paths.contains(&path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub stage: Stage,
    pub kind: ActionKind,
    pub guard: ModeGuard,
    pub on_approval: Option<Stage>,
    pub on_completion: Option<Stage>,
}

const fn rule(
    stage: Stage,
    kind: ActionKind,
    guard: ModeGuard,
    on_approval: Option<Stage>,
    on_completion: Option<Stage>,
) -> Rule {
    Rule {
        stage,
        kind,
        guard,
        on_approval,
        on_completion,
    }
}

const GATHER_PATHS: &[PipelinePath] = &[PipelinePath::Standard, PipelinePath::Full];
const DIRECT_PATHS: &[PipelinePath] = &[PipelinePath::Direct];
const SKIP_REFINE_PATHS: &[PipelinePath] = &[PipelinePath::Standard, PipelinePath::Direct];

use ActionKind as K;
use ModeGuard::{Any, Paths};
use Stage as S;

pub static RULES: &[Rule] = &[
    rule(S::Initial, K::Classify, Any, None, Some(S::Classified)),
    rule(S::Initial, K::StartGathering, Any, Some(S::Gathering), None),
    rule(S::Classified, K::StartGathering, Paths(GATHER_PATHS), Some(S::Gathering), None),
    rule(S::Classified, K::StartExecution, Paths(DIRECT_PATHS), None, Some(S::Executing)),
    rule(S::Gathering, K::Gather, Any, None, None),
    rule(S::Gathering, K::StartRefining, Any, Some(S::Refining), None),
    rule(S::Gathering, K::StartPlanning, Paths(SKIP_REFINE_PATHS), Some(S::PlanningActive), None),
    rule(S::Refining, K::Gather, Any, None, None),
    rule(S::Refining, K::Refine, Any, None, None),
    rule(S::Refining, K::StartPlanning, Any, Some(S::PlanningActive), None),
    rule(S::PlanningActive, K::Gather, Any, None, None),
    rule(S::PlanningActive, K::Refine, Any, None, None),
    rule(S::PlanningActive, K::StartExecution, Any, None, Some(S::Executing)),
    rule(S::Executing, K::Execute, Any, None, None),
    rule(S::Executing, K::Complete, Any, Some(S::Complete), None),
    rule(S::Complete, K::StartGathering, Any, Some(S::Gathering), None),
    rule(S::Complete, K::Classify, Any, None, Some(S::Classified)),
];

/// Result of looking an action up against the current stage and path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Permitted(Rule),
    /// A rule exists but the mode has not been resolved.
    AwaitingMode(Rule),
    /// A rule exists but this path does not allow it.
    WrongPath(Rule),
    NotInStage,
}

pub fn lookup(stage: Stage, kind: ActionKind, path: PipelinePath) -> Lookup {
    let Some(found) = RULES.iter().find(|r| r.stage == stage && r.kind == kind) else {
        return Lookup::NotInStage;
    };
    if found.guard.admits(path) {
        Lookup::Permitted(*found)
    } else if path == PipelinePath::Unresolved {
        Lookup::AwaitingMode(*found)
    } else {
        Lookup::WrongPath(*found)
    }
}

/// Kinds that would be accepted in `stage` for `path`, in table order.
pub fn permitted_kinds(stage: Stage, path: PipelinePath) -> Vec<ActionKind> {
    RULES
        .iter()
        .filter(|r| r.stage == stage && r.guard.admits(path))
        .map(|r| r.kind)
        .collect()
}

/// Every stage reachable from `from` through one rule, for any path.
pub fn successors(from: Stage) -> Vec<Stage> {
    let mut next: Vec<Stage> = RULES
        .iter()
        .filter(|r| r.stage == from)
        .flat_map(|r| [r.on_approval, r.on_completion])
        .flatten()
        .collect();
    next.push(from);
    next.dedup();
    next
}
