//! db-audit - run one audit query against a list of databases.

mod cli;
mod logging;

use cli::Cli;
use db_audit::activity::ActivityLog;
use db_audit::db::SqlxConnector;
use db_audit::error::Result;
use db_audit::runner::{run_audit, RunSummary, TargetOutcome};
use db_audit::stamp::RunStamp;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();
    logging::init_stderr_logging();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every target succeeded.
async fn run() -> Result<bool> {
    let stamp = RunStamp::now();
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = cli.load_config(&config_path)?;

    let mut log = ActivityLog::create(&config.report_dir, &stamp)?;
    info!("Activity log: {}", log.path().display());

    let summary = match run_audit(&config, &SqlxConnector, &mut log, &stamp).await {
        Ok(summary) => summary,
        Err(e) => {
            // The log itself may be what failed
            let _ = log.record_error(&e);
            return Err(e);
        }
    };

    print_summary(&summary, log.path());
    Ok(summary.is_success())
}

fn print_summary(summary: &RunSummary, log_path: &Path) {
    for run in &summary.targets {
        let status = match &run.outcome {
            TargetOutcome::Succeeded { rows } => format!("{rows} rows"),
            TargetOutcome::Failed(e) => format!("FAILED: {e}"),
            TargetOutcome::Skipped => "skipped".to_string(),
        };
        println!("{} ({}): {status}", run.target.endpoint, run.target.customer);
    }

    match &summary.report_path {
        Some(path) => println!("Report: {}", path.display()),
        None if summary.aborted => println!("Run aborted, no report written"),
        None => println!("No results to report"),
    }
    println!("Log: {}", log_path.display());
    println!("Timer: {:?}", summary.elapsed);
}
