//! Integration tests for db-audit.

pub mod audit_run_test;
pub mod common;
pub mod config_test;
