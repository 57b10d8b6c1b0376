use clap::Parser;
use std::process::ExitCode;

use pipeline_gate::cli::{commands::App, Cli};
use pipeline_gate::{init_telemetry, HookOutcome, PipelineGateConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _ = PipelineGateConfig::load_env_file();
    let config = match PipelineGateConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pipeline-gate: {e:#}");
            return ExitCode::from(HookOutcome::InternalError.exit_code());
        }
    };

    if let Err(e) = init_telemetry(&config.observability) {
        eprintln!("pipeline-gate: {e:#}");
    }

    let app = App::build(config, cli.root);
    match cli.command.run(&app) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("❌ {e:#}");
            ExitCode::from(HookOutcome::InternalError.exit_code())
        }
    }
}
