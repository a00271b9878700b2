//! Per-run timestamp and collision-free output files.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Format of the timestamp embedded in output file names.
pub const STAMP_FORMAT: &str = "-%m-%d-%Y--%H-%M-%S";

/// Upper bound on `_<n>` suffixes tried before giving up.
const MAX_SUFFIX: u32 = 999;

/// The moment a run started, captured once and shared by every output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    started_at: DateTime<Local>,
    label: String,
}

impl RunStamp {
    /// Captures the current local time.
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    /// Creates a stamp for the given instant.
    pub fn at(started_at: DateTime<Local>) -> Self {
        Self {
            label: started_at.format(STAMP_FORMAT).to_string(),
            started_at,
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// The formatted timestamp, e.g. `-10-21-2020--08-15-00`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `<prefix><label>`.
    pub fn file_stem(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.label)
    }
}

/// Creates `<dir>/<stem>.<extension>` without ever truncating an existing file.
///
/// If the name is taken, `_1`, `_2`, ... is appended to the stem.
pub fn create_unique(dir: &Path, stem: &str, extension: &str) -> io::Result<(PathBuf, File)> {
    for suffix in 0..=MAX_SUFFIX {
        let name = if suffix == 0 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_{suffix}.{extension}")
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "{} already holds {} files named {stem}",
            dir.display(),
            MAX_SUFFIX + 1
        ),
    ))
}
