//! Plaintext activity log for one run.
//!
//! Every step of a run is appended as a timestamped line to
//! `<report-dir>/oracle_checks<stamp>.log`. Lines are flushed as they are
//! written, so a run that dies midway still leaves everything it did on disk.
//! Each line is mirrored to `tracing`.

use crate::error::{AuditError, Result};
use crate::stamp::{create_unique, RunStamp};
use chrono::Local;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name prefix of the activity log.
pub const LOG_PREFIX: &str = "oracle_checks";

const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log of what a run did.
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ActivityLog {
    /// Creates the log file for `stamp` in `dir`, creating `dir` if needed.
    pub fn create(dir: &Path, stamp: &RunStamp) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            AuditError::report(format!("Cannot create report directory {}: {e}", dir.display()))
        })?;

        let (path, file) = create_unique(dir, &stamp.file_stem(LOG_PREFIX), "log").map_err(|e| {
            AuditError::report(format!("Cannot create activity log in {}: {e}", dir.display()))
        })?;

        debug!("Activity log: {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a progress line.
    pub fn record(&mut self, message: impl AsRef<str>) -> Result<()> {
        let message = message.as_ref();
        info!("{message}");
        self.write_line(&format!("[{}] {message}", Local::now().format(LINE_TIME_FORMAT)))
    }

    /// Appends a detail line (raw result rows) without echoing it at info level.
    pub fn record_detail(&mut self, message: impl AsRef<str>) -> Result<()> {
        let message = message.as_ref();
        debug!("{message}");
        self.write_line(&format!("[{}] {message}", Local::now().format(LINE_TIME_FORMAT)))
    }

    /// Appends an error line in the `<time> -- Got Exception: <error>` form.
    ///
    /// Not echoed to `tracing`; callers report the error themselves.
    pub fn record_error(&mut self, err: &AuditError) -> Result<()> {
        self.write_line(&format!(
            "{} -- Got Exception: {err}",
            Local::now().format(LINE_TIME_FORMAT)
        ))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|e| {
                AuditError::report(format!(
                    "Cannot write activity log {}: {e}",
                    self.path.display()
                ))
            })
    }
}

impl Drop for ActivityLog {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush activity log {}: {e}", self.path.display());
        }
    }
}
