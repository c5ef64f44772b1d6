// src/main.rs

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use vanguard_scan_runner::core::config::EngineConfig;
use vanguard_scan_runner::core::models::ScanRequest;
use vanguard_scan_runner::core::orchestrator::ScanOrchestrator;
use vanguard_scan_runner::logging;

/// Runs one scan request through the containerized scanners and reports the
/// aggregated result to the request's callback URL.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Scan request JSON file. Read from stdin when omitted.
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Engine configuration JSON file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result without posting it to the callback URL.
    #[arg(long)]
    no_callback: bool,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = Args::parse();

    // Logging reads the local UTC offset, which only works before the runtime
    // starts its worker threads.
    let log_path = logging::initialize_logging()?;
    info!(log_file = %log_path.display(), "Logging initialized.");

    let config = EngineConfig::load(args.config.as_deref()).wrap_err("failed to load engine configuration")?;
    let request = read_request(args.request.as_ref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config, request, args.no_callback))
}

fn read_request(path: Option<&PathBuf>) -> Result<ScanRequest> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read scan request from {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).wrap_err("failed to read scan request from stdin")?,
    };
    serde_json::from_str(&raw).wrap_err("scan request is not valid JSON")
}

async fn run(config: EngineConfig, request: ScanRequest, no_callback: bool) -> Result<ExitCode> {
    let mut orchestrator = ScanOrchestrator::from_config(&config).wrap_err("failed to build callback client")?;
    if no_callback {
        orchestrator = orchestrator.with_callbacks_disabled();
    }

    match orchestrator.run(&request).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(scan_id = request.scan_id(), error = %e, "Scan request rejected.");
            let rejection = json!({
                "scanId": request.scan_id(),
                "status": "FAILED",
                "violations": e.violations,
            });
            println!("{}", serde_json::to_string_pretty(&rejection)?);
            Ok(ExitCode::from(2))
        }
    }
}
