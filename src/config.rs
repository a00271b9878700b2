//! Configuration management for db-audit.
//!
//! Loads the run configuration from a TOML file once at startup: the audit
//! targets, the shared credentials, the audit query and where reports go.
//! The resulting [`Config`] is treated as immutable for the rest of the run.

use crate::db::DatabaseBackend;
use crate::error::{AuditError, Result};
use crate::safety;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Placeholder in the audit query that is replaced by the check day.
pub const CHECK_DAY_PLACEHOLDER: &str = "{check_day}";

/// The audit query run against every target when the config file has none.
///
/// Lists the sessions recorded in `audit_session` on the check day.
pub const GENERIC_QUERY: &str = "SELECT os_username AS os_user, username, userhost, \
action_name, logon_time, logoff_time, \
CASE WHEN returncode = 0 THEN 'SUCCESS' ELSE 'FAILED' END AS login_status \
FROM audit_session WHERE date(logon_time) = '{check_day}'";

/// Environment variable consulted when the config file has no username.
pub const USER_ENV: &str = "DB_AUDIT_USER";

/// Environment variable consulted when the config file has no password.
pub const PASSWORD_ENV: &str = "DB_AUDIT_PASSWORD";

/// Main configuration structure for db-audit.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory receiving the CSV report and the activity log.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// What to do when a target fails.
    #[serde(default)]
    pub on_error: FailurePolicy,

    /// Credentials shared by every target.
    #[serde(default)]
    pub credentials: Credentials,

    /// The audit query.
    #[serde(default)]
    pub query: QueryConfig,

    /// Databases to audit, in the order they are visited.
    #[serde(default)]
    pub targets: Vec<Target>,
}

fn default_report_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("db-audit").join("reports"))
        .unwrap_or_else(|| PathBuf::from("reports"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            on_error: FailurePolicy::default(),
            credentials: Credentials::default(),
            query: QueryConfig::default(),
            targets: Vec::new(),
        }
    }
}

/// Behaviour of a run once a target fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed target and do not write a report.
    #[default]
    Abort,
    /// Log the failure, skip the target and report what the others returned.
    Continue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// Login shared by all targets.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

impl Credentials {
    /// Fills missing fields from `DB_AUDIT_USER` / `DB_AUDIT_PASSWORD`.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    /// Fills missing fields from the given lookup, keyed by env var name.
    pub fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.username.is_none() {
            self.username = lookup(USER_ENV);
        }
        if self.password.is_none() {
            self.password = lookup(PASSWORD_ENV);
        }
    }
}

/// The audit query and its date filter.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// SQL text; `{check_day}` is replaced with the check day as `YYYY-MM-DD`.
    #[serde(default = "default_sql")]
    pub sql: String,

    /// Day the query filters on. Defaults to the local date at startup.
    #[serde(default)]
    pub check_day: Option<NaiveDate>,
}

fn default_sql() -> String {
    GENERIC_QUERY.to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            sql: default_sql(),
            check_day: None,
        }
    }
}

impl QueryConfig {
    /// Returns the configured check day, or today.
    pub fn check_day(&self) -> NaiveDate {
        self.check_day.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Returns the SQL with the check day substituted.
    pub fn render(&self) -> String {
        self.render_for(self.check_day())
    }

    /// Returns the SQL with `day` substituted for the placeholder.
    pub fn render_for(&self, day: NaiveDate) -> String {
        self.sql
            .replace(CHECK_DAY_PLACEHOLDER, &day.format("%Y-%m-%d").to_string())
    }
}

/// One database to audit, labelled with the customer it belongs to.
///
/// The endpoint is either a URL (`postgres://host:5432/db`,
/// `sqlite:///var/audit/db.sqlite`) or a bare `host[:port]/database`,
/// which is treated as PostgreSQL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    pub endpoint: String,
    pub customer: String,
}

impl Target {
    /// Creates a new target.
    pub fn new(endpoint: impl Into<String>, customer: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            customer: customer.into(),
        }
    }

    /// Returns the backend selected by the endpoint's scheme.
    pub fn backend(&self) -> Result<DatabaseBackend> {
        match self.endpoint.split_once(':') {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("sqlite") => {
                Ok(DatabaseBackend::Sqlite)
            }
            Some((scheme, rest)) if rest.starts_with("//") => DatabaseBackend::parse(scheme)
                .ok_or_else(|| {
                    AuditError::config(format!(
                        "Unsupported scheme '{scheme}' in endpoint '{}'",
                        self.endpoint
                    ))
                }),
            _ => Ok(DatabaseBackend::Postgres),
        }
    }

    /// Returns the database name: the last path segment of the endpoint.
    pub fn database_name(&self) -> Result<String> {
        let path = match self.backend()? {
            DatabaseBackend::Sqlite => sqlite_path(&self.endpoint).to_string(),
            DatabaseBackend::Postgres => self.postgres_url()?.path().to_string(),
        };

        let name = path.rsplit('/').next().unwrap_or_default();
        if name.is_empty() {
            return Err(AuditError::config(format!(
                "Endpoint '{}' does not name a database",
                self.endpoint
            )));
        }
        Ok(decode_component(name))
    }

    /// Builds the connection settings for this target.
    ///
    /// Credentials embedded in the endpoint take precedence over the shared ones.
    pub fn connection_config(&self, credentials: &Credentials) -> Result<ConnectionConfig> {
        match self.backend()? {
            DatabaseBackend::Sqlite => Ok(ConnectionConfig {
                backend: DatabaseBackend::Sqlite,
                database: sqlite_path(&self.endpoint).to_string(),
                ..Default::default()
            }),
            DatabaseBackend::Postgres => {
                let url = self.postgres_url()?;
                let user = if url.username().is_empty() {
                    credentials.username.clone()
                } else {
                    Some(decode_component(url.username()))
                };
                let password = url
                    .password()
                    .map(decode_component)
                    .or_else(|| credentials.password.clone());

                Ok(ConnectionConfig {
                    backend: DatabaseBackend::Postgres,
                    host: url.host_str().map(String::from),
                    port: url.port().unwrap_or(DatabaseBackend::Postgres.default_port()),
                    database: self.database_name()?,
                    user,
                    password,
                    options: url.query().map(String::from),
                })
            }
        }
    }

    fn postgres_url(&self) -> Result<Url> {
        let raw = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("postgres://{}", self.endpoint)
        };
        Url::parse(&raw).map_err(|e| {
            AuditError::config(format!("Invalid endpoint '{}': {e}", self.endpoint))
        })
    }
}

/// Percent-decodes one URL component, keeping it as-is if it is not valid UTF-8.
fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Strips the `sqlite:` / `sqlite://` prefix and any `?options`.
fn sqlite_path(endpoint: &str) -> &str {
    let rest = match endpoint.split_once(':') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("sqlite") => {
            rest.strip_prefix("//").unwrap_or(rest)
        }
        _ => endpoint,
    };
    rest.split('?').next().unwrap_or(rest)
}

/// Resolved settings for one database connection.
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    pub backend: DatabaseBackend,

    /// Database host (PostgreSQL only).
    pub host: Option<String>,

    /// Database port (PostgreSQL only).
    pub port: u16,

    /// Database name, or the file path for SQLite.
    pub database: String,

    pub user: Option<String>,

    pub password: Option<String>,

    /// Raw query string from the endpoint URL (e.g. `sslmode=require`).
    pub options: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("options", &self.options)
            .finish()
    }
}

impl ConnectionConfig {
    /// Converts the connection config to a connection string.
    ///
    /// User and password are percent-encoded.
    pub fn to_connection_string(&self) -> Result<String> {
        match self.backend {
            DatabaseBackend::Sqlite => Ok(format!("sqlite://{}", self.database)),
            DatabaseBackend::Postgres => {
                let host = self.host.as_deref().unwrap_or("localhost");
                let mut url = Url::parse(&format!(
                    "postgres://{host}:{}/{}",
                    self.port, self.database
                ))
                .map_err(|e| AuditError::config(format!("Invalid connection settings: {e}")))?;

                if let Some(user) = &self.user {
                    url.set_username(user)
                        .map_err(|_| AuditError::config("Cannot set username on endpoint"))?;
                    if let Some(password) = &self.password {
                        url.set_password(Some(password))
                            .map_err(|_| AuditError::config("Cannot set password on endpoint"))?;
                    }
                }
                url.set_query(self.options.as_deref());

                Ok(url.to_string())
            }
        }
    }

    /// Returns a display-safe string (no password) for log lines.
    pub fn display_string(&self) -> String {
        match self.backend {
            DatabaseBackend::Sqlite => format!("{} ({})", self.database, self.backend.as_str()),
            DatabaseBackend::Postgres => {
                let host = self.host.as_deref().unwrap_or("localhost");
                format!("{} @ {host}:{}", self.database, self.port)
            }
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-audit")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration, which has no targets
    /// and therefore fails [`Config::validate`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AuditError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AuditError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Checks that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(AuditError::config("No targets configured"));
        }

        if self.report_dir.as_os_str().is_empty() {
            return Err(AuditError::config("report_dir must not be empty"));
        }

        for target in &self.targets {
            if target.customer.trim().is_empty() {
                return Err(AuditError::config(format!(
                    "Target '{}' has no customer label",
                    target.endpoint
                )));
            }
            target.database_name()?;
        }

        if !self.query.sql.contains(CHECK_DAY_PLACEHOLDER) {
            debug!("Audit query has no {CHECK_DAY_PLACEHOLDER} placeholder");
        }

        safety::ensure_read_only(&self.query.render())
    }
}
