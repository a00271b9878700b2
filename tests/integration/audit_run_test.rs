//! End-to-end audit runs against SQLite targets.

use super::common::*;
use chrono::{Local, TimeZone};
use db_audit::config::FailurePolicy;
use db_audit::runner::TargetOutcome;
use db_audit::stamp::RunStamp;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const HEADER: &str = "\"CUSTOMER\",\"DATABASE\",\"os_user\",\"username\",\"userhost\",\
\"action_name\",\"logon_time\",\"logoff_time\",\"login_status\"";

#[tokio::test]
async fn test_report_holds_rows_from_every_target() {
    let dir = tempdir().unwrap();
    let db1 = seed_database(dir.path(), "db1.db", &[SCOTT, HR_FAILED, PREVIOUS_DAY]).await;
    let db2 = seed_database(dir.path(), "db2.db", &[SCOTT]).await;
    let reports = dir.path().join("reports");
    let config = audit_config(
        &reports,
        vec![
            sqlite_target(&db1, "customer1"),
            sqlite_target(&db2, "customer2"),
        ],
        FailurePolicy::Abort,
    );

    let (summary, _) = run(&config, &RunStamp::now()).await;

    assert!(summary.is_success());
    let path = summary.report_path.expect("report should be written");
    let expected = [
        HEADER,
        "\"customer1\",\"db1.db\",\"oracle\",\"SCOTT\",\"app01\",\"LOGON\",\
         \"2020-10-21 08:15:00\",\"2020-10-21 09:00:00\",\"SUCCESS\"",
        "\"customer1\",\"db1.db\",\"oracle\",\"HR\",\"app02\",\"LOGON\",\
         \"2020-10-21 10:00:00\",\"NULL\",\"FAILED\"",
        "\"customer2\",\"db2.db\",\"oracle\",\"SCOTT\",\"app01\",\"LOGON\",\
         \"2020-10-21 08:15:00\",\"2020-10-21 09:00:00\",\"SUCCESS\"",
    ]
    .join("\n")
        + "\n";
    assert_eq!(std::fs::read_to_string(path).unwrap(), expected);
}

#[tokio::test]
async fn test_no_rows_on_check_day_writes_no_report() {
    let dir = tempdir().unwrap();
    let db1 = seed_database(dir.path(), "db1.db", &[PREVIOUS_DAY]).await;
    let db2 = seed_database(dir.path(), "db2.db", &[]).await;
    let reports = dir.path().join("reports");
    let config = audit_config(
        &reports,
        vec![
            sqlite_target(&db1, "customer1"),
            sqlite_target(&db2, "customer2"),
        ],
        FailurePolicy::Abort,
    );

    let (summary, log_text) = run(&config, &RunStamp::now()).await;

    assert!(summary.is_success());
    assert!(summary.report_path.is_none());
    assert!(files_with_extension(&reports, "csv").is_empty());
    assert!(log_text.contains("No results to report"));
    // the header is known even though nothing matched
    assert_eq!(
        summary.report.header(),
        vec![
            "CUSTOMER",
            "DATABASE",
            "os_user",
            "username",
            "userhost",
            "action_name",
            "logon_time",
            "logoff_time",
            "login_status",
        ]
    );
}

#[tokio::test]
async fn test_missing_second_database_aborts_run() {
    let dir = tempdir().unwrap();
    let db1 = seed_database(dir.path(), "db1.db", &[SCOTT]).await;
    let missing = dir.path().join("db2.db");
    let reports = dir.path().join("reports");
    let config = audit_config(
        &reports,
        vec![
            sqlite_target(&db1, "customer1"),
            sqlite_target(&missing, "customer2"),
        ],
        FailurePolicy::Abort,
    );

    let (summary, log_text) = run(&config, &RunStamp::now()).await;

    assert!(summary.aborted);
    assert!(!summary.is_success());
    assert!(matches!(
        summary.targets[1].outcome,
        TargetOutcome::Failed(db_audit::error::AuditError::Connection(_))
    ));
    assert!(summary.report_path.is_none());
    assert!(files_with_extension(&reports, "csv").is_empty());
    assert!(summary.report.rows_for("db2.db").is_none());

    assert!(log_text.contains("Querying db1.db"));
    assert!(log_text.contains("SCOTT"));
    assert!(log_text.contains("Got Exception"));
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_continue_on_error_reports_remaining_targets() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("db1.db");
    let db2 = seed_database(dir.path(), "db2.db", &[HR_FAILED]).await;
    let reports = dir.path().join("reports");
    let config = audit_config(
        &reports,
        vec![
            sqlite_target(&missing, "customer1"),
            sqlite_target(&db2, "customer2"),
        ],
        FailurePolicy::Continue,
    );

    let (summary, _) = run(&config, &RunStamp::now()).await;

    assert_eq!(summary.failures(), 1);
    assert_eq!(summary.report.total_rows(), 1);
    let content = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.lines().nth(1).unwrap().starts_with("\"customer2\",\"db2.db\""));
}

#[tokio::test]
async fn test_two_runs_produce_distinct_files() {
    let dir = tempdir().unwrap();
    let db1 = seed_database(dir.path(), "db1.db", &[SCOTT]).await;
    let reports = dir.path().join("reports");
    let config = audit_config(
        &reports,
        vec![sqlite_target(&db1, "customer1")],
        FailurePolicy::Abort,
    );
    // same second on the clock for both runs
    let stamp = RunStamp::at(Local.with_ymd_and_hms(2020, 10, 22, 6, 0, 0).unwrap());

    let (first, _) = run(&config, &stamp).await;
    let (second, _) = run(&config, &stamp).await;

    let first = first.report_path.unwrap();
    let second = second.report_path.unwrap();
    assert_ne!(first, second);
    assert_eq!(files_with_extension(&reports, "csv").len(), 2);
    assert_eq!(files_with_extension(&reports, "log").len(), 2);
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        std::fs::read_to_string(&second).unwrap()
    );
    assert!(first
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("generic_query_-10-22-2020--06-00-00"));
}
