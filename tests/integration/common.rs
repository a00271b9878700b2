//! Shared fixtures: seeded SQLite audit databases.

use db_audit::activity::ActivityLog;
use db_audit::config::{Config, FailurePolicy, QueryConfig, Target};
use db_audit::db::SqlxConnector;
use db_audit::runner::{run_audit, RunSummary};
use db_audit::stamp::RunStamp;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};

/// One row of `audit_session`.
pub struct Session {
    pub username: &'static str,
    pub userhost: &'static str,
    pub logon_time: &'static str,
    pub logoff_time: Option<&'static str>,
    pub returncode: i64,
}

pub fn check_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 10, 21).unwrap()
}

/// Creates `<dir>/<name>` holding an `audit_session` table with `sessions`.
pub async fn seed_database(dir: &Path, name: &str, sessions: &[Session]) -> PathBuf {
    let path = dir.join(name);
    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();

    sqlx::query(
        "CREATE TABLE audit_session (os_username TEXT, username TEXT, userhost TEXT, \
         action_name TEXT, logon_time TEXT, logoff_time TEXT, returncode INTEGER)",
    )
    .execute(&mut conn)
    .await
    .unwrap();

    for session in sessions {
        sqlx::query("INSERT INTO audit_session VALUES ('oracle', ?, ?, 'LOGON', ?, ?, ?)")
            .bind(session.username)
            .bind(session.userhost)
            .bind(session.logon_time)
            .bind(session.logoff_time)
            .bind(session.returncode)
            .execute(&mut conn)
            .await
            .unwrap();
    }

    conn.close().await.unwrap();
    path
}

pub fn sqlite_target(path: &Path, customer: &str) -> Target {
    Target::new(format!("sqlite://{}", path.display()), customer)
}

pub fn audit_config(report_dir: &Path, targets: Vec<Target>, on_error: FailurePolicy) -> Config {
    Config {
        report_dir: report_dir.to_path_buf(),
        on_error,
        query: QueryConfig {
            check_day: Some(check_day()),
            ..Default::default()
        },
        targets,
        ..Default::default()
    }
}

/// Runs a full audit with the sqlx connector; returns the summary and log text.
pub async fn run(config: &Config, stamp: &RunStamp) -> (RunSummary, String) {
    config.validate().unwrap();
    let mut log = ActivityLog::create(&config.report_dir, stamp).unwrap();
    let summary = run_audit(config, &SqlxConnector, &mut log, stamp)
        .await
        .unwrap();
    let log_text = std::fs::read_to_string(log.path()).unwrap();
    (summary, log_text)
}

pub fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    files
}

pub const SCOTT: Session = Session {
    username: "SCOTT",
    userhost: "app01",
    logon_time: "2020-10-21 08:15:00",
    logoff_time: Some("2020-10-21 09:00:00"),
    returncode: 0,
};

pub const HR_FAILED: Session = Session {
    username: "HR",
    userhost: "app02",
    logon_time: "2020-10-21 10:00:00",
    logoff_time: None,
    returncode: 1017,
};

/// Logged on the day before the check day; must never be reported.
pub const PREVIOUS_DAY: Session = Session {
    username: "OLD",
    userhost: "app01",
    logon_time: "2020-10-20 23:59:59",
    logoff_time: Some("2020-10-21 00:10:00"),
    returncode: 0,
};
