//! Loading a TOML config file and running it.

use super::common::*;
use db_audit::config::{Config, FailurePolicy};
use db_audit::stamp::RunStamp;
use tempfile::tempdir;

#[tokio::test]
async fn test_toml_config_drives_a_run() {
    let dir = tempdir().unwrap();
    let db1 = seed_database(dir.path(), "db1.db", &[SCOTT, PREVIOUS_DAY]).await;
    let reports = dir.path().join("reports");
    let config_path = dir.path().join("audit.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
report_dir = "{reports}"
on_error = "continue"

[query]
check_day = "2020-10-20"

[[targets]]
endpoint = "sqlite://{db1}"
customer = "customer1"
"#,
            reports = reports.display(),
            db1 = db1.display()
        ),
    )
    .unwrap();

    let config = Config::load_from_file(&config_path).unwrap();
    assert_eq!(config.on_error, FailurePolicy::Continue);

    let (summary, _) = run(&config, &RunStamp::now()).await;

    let rows: Vec<&Vec<String>> = summary.report.rows().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][3], "OLD");
    assert!(summary.report_path.unwrap().starts_with(&reports));
}

#[test]
fn test_config_with_unsafe_query_is_rejected() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("audit.toml");
    std::fs::write(
        &config_path,
        r#"
[query]
sql = "DELETE FROM audit_session WHERE date(logon_time) = '{check_day}'"

[[targets]]
endpoint = "hostname/db1"
customer = "customer1"
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&config_path).unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(err.category(), "Configuration Error");
}
