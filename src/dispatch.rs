//! Host boundary.
//!
//! Turns host requests into engine calls and engine results into responses
//! and exit codes. This is the only place that decides to fail open: any
//! error below here is logged, journaled where possible, and converted into
//! an approval carrying a `warning`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::journal::{JournalEntry, JournalEvent};
use crate::observability::{create_workflow_span, GateMetrics, OperationTimer};
use crate::store::{NamespaceId, NamespaceResolver};
use crate::telemetry::generate_correlation_id;
use crate::workflow::{AdvanceOutcome, GateError, ResetReport, Stage, WorkflowEngine};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub result_payload: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub approve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl CheckResponse {
    fn fail_open(warning: String) -> Self {
        Self {
            approve: true,
            warning: Some(warning),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceStatus {
    Recorded,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub status: AdvanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl AdvanceResponse {
    fn ignored(stage: Option<Stage>, warning: Option<String>) -> Self {
        Self {
            status: AdvanceStatus::Ignored,
            stage,
            warning,
        }
    }
}

/// How the host should read the process result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Approved,
    Blocked,
    InternalError,
}

impl HookOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            HookOutcome::Approved => 0,
            HookOutcome::Blocked => 2,
            HookOutcome::InternalError => 1,
        }
    }
}

pub struct HookDispatcher {
    engine: WorkflowEngine,
    resolver: NamespaceResolver,
    metrics: GateMetrics,
}

impl HookDispatcher {
    pub fn new(engine: WorkflowEngine, resolver: NamespaceResolver) -> Self {
        Self {
            engine,
            resolver,
            metrics: GateMetrics::new(),
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &NamespaceResolver {
        &self.resolver
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    pub fn namespace(&self, explicit: Option<&str>) -> NamespaceId {
        self.resolver.resolve(explicit)
    }

    /// Handle a raw check request body.
    pub fn check_json(&self, input: &str) -> (CheckResponse, HookOutcome) {
        match serde_json::from_str::<CheckRequest>(input) {
            Ok(request) => self.check(request),
            Err(e) => {
                warn!(error = %e, "Unparseable check request, approving");
                self.metrics.record_fail_open();
                (
                    CheckResponse::fail_open(format!("unparseable request: {e}")),
                    HookOutcome::Approved,
                )
            }
        }
    }

    pub fn check(&self, request: CheckRequest) -> (CheckResponse, HookOutcome) {
        let namespace = self.namespace(request.namespace.as_deref());
        let Some(action_id) = request.action_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            warn!(namespace = %namespace, "Check request without an action id, approving");
            self.metrics.record_fail_open();
            return (
                CheckResponse::fail_open("missing actionId".to_string()),
                HookOutcome::Approved,
            );
        };

        let span = create_workflow_span("check", namespace.as_str(), &generate_correlation_id());
        let _entered = span.enter();
        let timer = OperationTimer::new("check");

        let result = match self.engine.check(&namespace, action_id) {
            Ok(decision) if decision.approve => {
                self.metrics.record_approval();
                (
                    CheckResponse {
                        approve: true,
                        reason: decision.reason,
                        token: decision.token,
                        stage: decision.stage,
                        warning: None,
                    },
                    HookOutcome::Approved,
                )
            }
            Ok(decision) => {
                self.metrics.record_block();
                (
                    CheckResponse {
                        approve: false,
                        reason: decision.reason,
                        token: None,
                        stage: decision.stage,
                        warning: None,
                    },
                    HookOutcome::Blocked,
                )
            }
            Err(e) => {
                self.fail_open_error(&namespace, action_id, &e);
                (
                    CheckResponse::fail_open(format!("enforcement unavailable: {e}")),
                    HookOutcome::Approved,
                )
            }
        };
        timer.finish();
        self.metrics.log_stats();
        result
    }

    /// Handle a raw advance request body. Never fails.
    pub fn advance_json(&self, input: &str) -> AdvanceResponse {
        match serde_json::from_str::<AdvanceRequest>(input) {
            Ok(request) => self.advance(request),
            Err(e) => {
                warn!(error = %e, "Unparseable advance request, ignoring");
                AdvanceResponse::ignored(None, Some(format!("unparseable request: {e}")))
            }
        }
    }

    pub fn advance(&self, request: AdvanceRequest) -> AdvanceResponse {
        let namespace = self.namespace(request.namespace.as_deref());
        let Some(action_id) = request.action_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            warn!(namespace = %namespace, "Advance request without an action id, ignoring");
            return AdvanceResponse::ignored(None, Some("missing actionId".to_string()));
        };

        let span = create_workflow_span("advance", namespace.as_str(), &generate_correlation_id());
        let _entered = span.enter();
        let timer = OperationTimer::new("advance");

        let response = match self.engine.advance(
            &namespace,
            action_id,
            request.token.as_deref(),
            request.result_payload.as_ref(),
        ) {
            Ok(AdvanceOutcome::Transitioned { to, .. }) => AdvanceResponse {
                status: AdvanceStatus::Recorded,
                stage: Some(to),
                warning: None,
            },
            Ok(AdvanceOutcome::Recorded { stage }) => AdvanceResponse {
                status: AdvanceStatus::Recorded,
                stage: Some(stage),
                warning: None,
            },
            Ok(AdvanceOutcome::Ignored { stage, .. }) => AdvanceResponse::ignored(stage, None),
            Err(e) => {
                self.fail_open_error(&namespace, action_id, &e);
                AdvanceResponse::ignored(None, Some(format!("completion not recorded: {e}")))
            }
        };
        timer.finish();
        response
    }

    /// Operator reset. Errors propagate: a failed reset must be visible.
    pub fn reset(&self, namespace: Option<&str>, reason: &str) -> Result<ResetReport, GateError> {
        let namespace = self.namespace(namespace);
        let span = create_workflow_span("reset", namespace.as_str(), &generate_correlation_id());
        let _entered = span.enter();
        self.engine.reset(&namespace, reason)
    }

    fn fail_open_error(&self, namespace: &NamespaceId, action_id: &str, e: &GateError) {
        self.metrics.record_fail_open();
        error!(namespace = %namespace, action = %action_id, error = %e, "Enforcement failed, proceeding without it");
        self.engine.journal().record(
            JournalEntry::new(namespace, JournalEvent::Error, self.engine.clock().now())
                .action(action_id)
                .reason(e.to_string()),
        );
    }
}
