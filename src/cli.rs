//! Command-line argument parsing for db-audit.

use chrono::NaiveDate;
use clap::Parser;
use db_audit::config::{Config, FailurePolicy};
use db_audit::error::Result;
use std::path::{Path, PathBuf};

/// Runs the audit query against every configured database and writes a CSV report.
#[derive(Parser, Debug)]
#[command(name = "db-audit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short = 'c', long, value_name = "PATH", env = "DB_AUDIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the report and activity log (overrides report_dir)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Day the audit query filters on (overrides query.check_day)
    #[arg(short = 'd', long, value_name = "YYYY-MM-DD")]
    pub check_day: Option<NaiveDate>,

    /// Skip failed targets and report the rest instead of aborting
    #[arg(long)]
    pub continue_on_error: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.report_dir {
            config.report_dir = dir.clone();
        }
        if let Some(day) = self.check_day {
            config.query.check_day = Some(day);
        }
        if self.continue_on_error {
            config.on_error = FailurePolicy::Continue;
        }
    }

    /// Loads, completes and validates the configuration for this run.
    ///
    /// The check day is pinned here so the whole run filters on one date.
    pub fn load_config(&self, path: &Path) -> Result<Config> {
        let mut config = Config::load_from_file(path)?;
        self.apply_overrides(&mut config);
        config.credentials.apply_env_defaults();
        config.query.check_day = Some(config.query.check_day());
        config.validate()?;
        Ok(config)
    }
}
