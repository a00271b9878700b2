//! db-audit - run one audit query against a list of databases.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod activity;
pub mod config;
pub mod db;
pub mod error;
pub mod report;
pub mod runner;
pub mod safety;
pub mod stamp;
