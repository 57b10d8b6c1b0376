use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Decision counters for one process
#[derive(Debug, Default)]
pub struct GateMetrics {
    pub approvals: AtomicU64,
    pub blocks: AtomicU64,
    pub fail_opens: AtomicU64,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_approval(&self) {
        self.approvals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fail_open(&self) {
        self.fail_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> GateStats {
        GateStats {
            approvals: self.approvals.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            fail_opens: self.fail_opens.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        debug!(
            approvals = stats.approvals,
            blocks = stats.blocks,
            fail_opens = stats.fail_opens,
            "Gate decision counters"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    pub approvals: u64,
    pub blocks: u64,
    pub fail_opens: u64,
}

/// Create correlated spans for gate operations
pub fn create_workflow_span(operation: &str, namespace: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "workflow",
        operation = operation,
        namespace = namespace,
        correlation.id = correlation_id
    )
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
