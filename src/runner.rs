//! Runs the audit query against every target, one after another.
//!
//! Each target is connected, queried and closed before the next one is
//! touched. What happens after a failure is governed by
//! [`FailurePolicy`]: `abort` stops the run and writes no report,
//! `continue` skips the failed target and reports the rest.

use crate::activity::ActivityLog;
use crate::config::{Config, FailurePolicy, Target};
use crate::db::{Connector, QueryResult};
use crate::error::{AuditError, Result};
use crate::report::{label_rows, Report};
use crate::stamp::RunStamp;
use chrono::Local;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::warn;

/// What happened to one target.
#[derive(Debug)]
pub enum TargetOutcome {
    /// The query ran; `rows` rows were added to the report.
    Succeeded { rows: usize },
    /// Connecting or querying failed.
    Failed(AuditError),
    /// Not visited because an earlier target aborted the run.
    Skipped,
}

#[derive(Debug)]
pub struct TargetRun {
    pub target: Target,
    pub outcome: TargetOutcome,
}

/// Result of a whole run.
#[derive(Debug)]
pub struct RunSummary {
    /// One entry per configured target, in configuration order.
    pub targets: Vec<TargetRun>,
    pub report: Report,
    /// Where the CSV was written, if it was.
    pub report_path: Option<PathBuf>,
    /// True when a failure stopped the run under [`FailurePolicy::Abort`].
    pub aborted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Number of targets that failed.
    pub fn failures(&self) -> usize {
        self.targets
            .iter()
            .filter(|run| matches!(run.outcome, TargetOutcome::Failed(_)))
            .count()
    }

    /// True when every target succeeded.
    pub fn is_success(&self) -> bool {
        !self.aborted && self.failures() == 0
    }
}

/// Visits targets in order and accumulates their rows.
pub struct Runner<'a> {
    config: &'a Config,
    connector: &'a dyn Connector,
    log: &'a mut ActivityLog,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config, connector: &'a dyn Connector, log: &'a mut ActivityLog) -> Self {
        Self {
            config,
            connector,
            log,
        }
    }

    /// Runs the audit and writes the report.
    ///
    /// Target failures are reported in the summary; only activity log and
    /// report I/O errors are returned as `Err`.
    pub async fn run(mut self, stamp: &RunStamp) -> Result<RunSummary> {
        let start = Instant::now();
        let config = self.config;
        self.log.record(format!(
            "Time Start: {}",
            stamp.started_at().format("%Y-%m-%d %H:%M:%S")
        ))?;

        let check_day = config.query.check_day();
        let sql = config.query.render_for(check_day);
        self.log.record(format!(
            "Check day: {check_day}, on error: {}",
            config.on_error
        ))?;

        let mut report = Report::new();
        let mut targets = Vec::with_capacity(config.targets.len());
        let mut aborted = false;

        for target in &config.targets {
            if aborted {
                targets.push(TargetRun {
                    target: target.clone(),
                    outcome: TargetOutcome::Skipped,
                });
                continue;
            }

            self.log.record(format!(
                "Current Database: {} ({})",
                target.endpoint, target.customer
            ))?;

            let outcome = match self.audit_target(target, &sql).await {
                Ok((database, result)) => self.collect(target, &database, &result, &mut report)?,
                Err(e @ AuditError::Report(_)) => return Err(e),
                Err(e) => {
                    warn!("{} failed: {e}", target.endpoint);
                    self.log.record_error(&e)?;
                    if config.on_error == FailurePolicy::Abort {
                        aborted = true;
                    }
                    TargetOutcome::Failed(e)
                }
            };

            targets.push(TargetRun {
                target: target.clone(),
                outcome,
            });
        }

        self.log.record("Writing out raw query results")?;
        self.log.record("Generic Query")?;

        let report_path = if aborted {
            self.log.record("Run aborted; no report written")?;
            None
        } else {
            match report.write_to_dir(&config.report_dir, stamp)? {
                Some(path) => {
                    self.log.record(format!(
                        "Wrote {} rows to {}",
                        report.total_rows(),
                        path.display()
                    ))?;
                    Some(path)
                }
                None => {
                    self.log.record("No results to report")?;
                    None
                }
            }
        };

        let elapsed = start.elapsed();
        self.log.record(format!(
            "Time End: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ))?;
        self.log.record(format!("Time Elapsed: {elapsed:?}"))?;

        Ok(RunSummary {
            targets,
            report,
            report_path,
            aborted,
            elapsed,
        })
    }

    /// Connects, queries and disconnects one target.
    ///
    /// The connection is closed whether or not the query succeeded.
    async fn audit_target(&mut self, target: &Target, sql: &str) -> Result<(String, QueryResult)> {
        let database = target.database_name()?;
        let conn_config = target.connection_config(&self.config.credentials)?;

        self.log.record(format!(
            "Logging into database {}",
            conn_config.display_string()
        ))?;
        let mut client = self.connector.connect(&conn_config).await?;

        let queried = match self.log.record(format!("Querying {database}")) {
            Ok(()) => client.execute_query(sql).await,
            Err(e) => Err(e),
        };

        let closed = client.close().await;
        self.log.record("Logging out from database")?;
        if let Err(e) = closed {
            warn!("Failed to close connection to {database}: {e}");
            self.log.record(format!("Logout from {database} failed: {e}"))?;
        }

        Ok((database, queried?))
    }

    fn collect(
        &mut self,
        target: &Target,
        database: &str,
        result: &QueryResult,
        report: &mut Report,
    ) -> Result<TargetOutcome> {
        if !report.set_columns(result.column_names()) {
            warn!("Columns returned by {database} differ from the first target's");
            self.log.record(format!(
                "Columns returned by {database} differ from the report header"
            ))?;
        }

        self.log.record(format!(
            "Raw Query results: {} rows in {:?}",
            result.row_count(),
            result.execution_time
        ))?;
        for row in &result.rows {
            let values: Vec<String> = row.iter().map(|v| v.to_display_string()).collect();
            self.log.record_detail(values.join(", "))?;
        }

        let rows = label_rows(&target.customer, database, result);
        let count = rows.len();
        report.add_rows(database, rows);

        Ok(TargetOutcome::Succeeded { rows: count })
    }
}

/// Runs a full audit for `config` using `connector` to reach the databases.
pub async fn run_audit(
    config: &Config,
    connector: &dyn Connector,
    log: &mut ActivityLog,
    stamp: &RunStamp,
) -> Result<RunSummary> {
    Runner::new(config, connector, log).run(stamp).await
}
