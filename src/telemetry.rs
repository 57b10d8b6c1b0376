use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Setting this to anything non-empty turns on debug logging.
pub const DEBUG_ENV: &str = "PIPELINE_GATE_DEBUG";

/// Initialize structured logging on stderr.
///
/// stdout belongs to the host protocol, so nothing here may write to it.
/// The filter comes from `RUST_LOG`, else `PIPELINE_GATE_DEBUG`, else the
/// configured level.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_filter(
        std::env::var("RUST_LOG").ok().as_deref(),
        std::env::var(DEBUG_ENV).ok().as_deref(),
        &config.log_level,
    );

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))?;

    tracing::debug!("pipeline-gate logging initialized");
    Ok(())
}

fn build_filter(rust_log: Option<&str>, debug: Option<&str>, configured: &str) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|s| !s.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    if debug.is_some_and(|v| !v.trim().is_empty() && v != "0") {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_wins_over_everything() {
        let filter = build_filter(Some("pipeline_gate=trace"), Some("1"), "error");
        assert_eq!(filter.to_string(), "pipeline_gate=trace");
    }

    #[test]
    fn debug_flag_beats_configured_level() {
        assert_eq!(build_filter(None, Some("1"), "error").to_string(), "debug");
        assert_eq!(build_filter(None, Some("0"), "error").to_string(), "error");
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(generate_correlation_id(), generate_correlation_id());
    }
}
