//! Mock database connector for testing.
//!
//! Serves canned results keyed by database name, so a whole audit run can be
//! exercised without a server.

use super::{Connector, DatabaseClient, QueryResult};
use crate::config::ConnectionConfig;
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Behavior {
    Rows(QueryResult),
    RefuseConnection(String),
    FailQuery(String),
}

/// A connector that hands out mock clients with predefined behaviour.
#[derive(Debug, Default)]
pub struct MockConnector {
    behaviors: HashMap<String, Behavior>,
    close_failures: HashMap<String, String>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Creates a connector that knows no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries against `database` return `result`.
    pub fn with_result(mut self, database: impl Into<String>, result: QueryResult) -> Self {
        self.behaviors.insert(database.into(), Behavior::Rows(result));
        self
    }

    /// Connecting to `database` fails with `message`.
    pub fn with_connection_failure(
        mut self,
        database: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.behaviors
            .insert(database.into(), Behavior::RefuseConnection(message.into()));
        self
    }

    /// Connecting to `database` succeeds but every query fails with `message`.
    pub fn with_query_failure(
        mut self,
        database: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.behaviors
            .insert(database.into(), Behavior::FailQuery(message.into()));
        self
    }

    /// Closing a connection to `database` fails with `message`.
    pub fn with_close_failure(
        mut self,
        database: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.close_failures.insert(database.into(), message.into());
        self
    }

    /// Number of connections handed out so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
        let behavior = match self.behaviors.get(&config.database) {
            Some(Behavior::RefuseConnection(message)) => {
                return Err(AuditError::connection(message.clone()))
            }
            Some(behavior) => behavior.clone(),
            None => {
                return Err(AuditError::connection(format!(
                    "Unknown mock database '{}'",
                    config.database
                )))
            }
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDatabaseClient {
            behavior,
            close_error: self.close_failures.get(&config.database).cloned(),
            closed: Arc::clone(&self.closed),
            is_open: true,
        }))
    }
}

/// A mock database client that returns predefined results.
pub struct MockDatabaseClient {
    behavior: Behavior,
    close_error: Option<String>,
    closed: Arc<AtomicUsize>,
    is_open: bool,
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&mut self, _sql: &str) -> Result<QueryResult> {
        if !self.is_open {
            return Err(AuditError::internal("Connection already closed"));
        }
        match &self.behavior {
            Behavior::Rows(result) => Ok(result.clone()),
            Behavior::FailQuery(message) => Err(AuditError::query(message.clone())),
            Behavior::RefuseConnection(message) => Err(AuditError::connection(message.clone())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.is_open {
            self.is_open = false;
            self.closed.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.close_error {
                return Err(AuditError::connection(message.clone()));
            }
        }
        Ok(())
    }
}
