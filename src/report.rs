//! The combined CSV report.
//!
//! Rows are grouped by database name in the order targets were visited.
//! Every field is written double-quoted and comma-separated:
//!
//! ```text
//! "CUSTOMER","DATABASE","OS_USER","USERNAME"
//! "customer1","db1","oracle","SCOTT"
//! ```

use crate::db::QueryResult;
use crate::error::{AuditError, Result};
use crate::stamp::{create_unique, RunStamp};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name prefix of the CSV report.
pub const REPORT_PREFIX: &str = "generic_query_";

/// Columns prepended to every query's own columns.
pub const LABEL_COLUMNS: [&str; 2] = ["CUSTOMER", "DATABASE"];

/// A report row: customer, database, then the query's values as text.
pub type LabeledRow = Vec<String>;

/// Rows collected from all targets plus the shared header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    query_columns: Option<Vec<String>>,
    sections: Vec<(String, Vec<LabeledRow>)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the query's column names.
    ///
    /// The first call wins. Returns false when a later call disagrees with it.
    pub fn set_columns(&mut self, columns: Vec<String>) -> bool {
        match &self.query_columns {
            Some(existing) => *existing == columns,
            None => {
                self.query_columns = Some(columns);
                true
            }
        }
    }

    /// `["CUSTOMER", "DATABASE"]` followed by the query's column names.
    pub fn header(&self) -> Vec<String> {
        LABEL_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.query_columns.iter().flatten().cloned())
            .collect()
    }

    /// Appends rows under `database`, after any rows already stored for it.
    pub fn add_rows(&mut self, database: &str, rows: Vec<LabeledRow>) {
        match self.sections.iter_mut().find(|(name, _)| name == database) {
            Some((_, existing)) => existing.extend(rows),
            None => self.sections.push((database.to_string(), rows)),
        }
    }

    /// Rows stored under `database`.
    pub fn rows_for(&self, database: &str) -> Option<&[LabeledRow]> {
        self.sections
            .iter()
            .find(|(name, _)| name == database)
            .map(|(_, rows)| rows.as_slice())
    }

    /// All rows in report order.
    pub fn rows(&self) -> impl Iterator<Item = &LabeledRow> {
        self.sections.iter().flat_map(|(_, rows)| rows.iter())
    }

    pub fn total_rows(&self) -> usize {
        self.sections.iter().map(|(_, rows)| rows.len()).sum()
    }

    /// Writes header and rows as quoted CSV.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        write_record(&mut out, &self.header())?;
        for row in self.rows() {
            write_record(&mut out, row)?;
        }
        out.flush()
    }

    /// Writes `<dir>/generic_query_<stamp>.csv`.
    ///
    /// Returns `Ok(None)` without touching the filesystem when there are no rows.
    pub fn write_to_dir(&self, dir: &Path, stamp: &RunStamp) -> Result<Option<PathBuf>> {
        if self.total_rows() == 0 {
            return Ok(None);
        }

        fs::create_dir_all(dir).map_err(|e| {
            AuditError::report(format!("Cannot create report directory {}: {e}", dir.display()))
        })?;

        let (path, file) = create_unique(dir, &stamp.file_stem(REPORT_PREFIX), "csv")
            .map_err(|e| AuditError::report(format!("Cannot create report: {e}")))?;

        self.write_csv(BufWriter::new(file))
            .map_err(|e| AuditError::report(format!("Cannot write {}: {e}", path.display())))?;

        Ok(Some(path))
    }
}

/// Prefixes every row of `result` with the customer and database labels.
pub fn label_rows(customer: &str, database: &str, result: &QueryResult) -> Vec<LabeledRow> {
    result
        .rows
        .iter()
        .map(|row| {
            [customer.to_string(), database.to_string()]
                .into_iter()
                .chain(row.iter().map(|value| value.to_display_string()))
                .collect()
        })
        .collect()
}

fn write_record<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|field| quote(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")
}

/// Wraps a field in double quotes, doubling any quote inside it.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
