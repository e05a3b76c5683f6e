//! Source database connection settings
//!
//! DuckDB reaches PostgreSQL, MySQL and SQLite through its scanner
//! extensions; the external database is attached read-only as `source_db`.

use crate::error::{Error, Result};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog name the source database is attached under
pub const SOURCE_CATALOG: &str = "source_db";

/// Kind of database behind the DuckDB connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Postgres,
    Mysql,
    Sqlite,
    #[default]
    Duckdb,
}

impl SourceKind {
    fn default_port(self) -> u16 {
        match self {
            SourceKind::Postgres => 5432,
            SourceKind::Mysql => 3306,
            SourceKind::Sqlite | SourceKind::Duckdb => 0,
        }
    }

    /// Schema used for streams without a namespace
    pub fn default_schema(self) -> Option<&'static str> {
        match self {
            SourceKind::Postgres => Some("public"),
            SourceKind::Mysql | SourceKind::Sqlite | SourceKind::Duckdb => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Postgres => "postgres",
            SourceKind::Mysql => "mysql",
            SourceKind::Sqlite => "sqlite",
            SourceKind::Duckdb => "duckdb",
        };
        f.write_str(name)
    }
}

/// How to reach the source database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Full connection string; wins over the individual parts
    #[serde(default)]
    pub connection_string: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or file path for SQLite and DuckDB
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Connect to a database of the given kind through a connection string
    pub fn new(kind: SourceKind, connection_string: impl Into<String>) -> Self {
        Self {
            kind,
            connection_string: Some(connection_string.into()),
            ..Self::default()
        }
    }

    /// Connection string handed to `ATTACH`
    pub fn connection_string(&self) -> String {
        if let Some(conn_str) = &self.connection_string {
            return conn_str.clone();
        }

        let host = self.host.as_deref().unwrap_or("localhost");
        let user = self.user.as_deref().unwrap_or("postgres");
        let password = self.password.as_deref().unwrap_or_default();
        let database = self.database.as_deref().unwrap_or(match self.kind {
            SourceKind::Postgres | SourceKind::Mysql => "postgres",
            SourceKind::Sqlite | SourceKind::Duckdb => ":memory:",
        });
        let port = self.port.unwrap_or(self.kind.default_port());

        match self.kind {
            SourceKind::Postgres => {
                format!("postgresql://{user}:{password}@{host}:{port}/{database}")
            }
            SourceKind::Mysql => format!("mysql://{user}:{password}@{host}:{port}/{database}"),
            SourceKind::Sqlite | SourceKind::Duckdb => database.to_string(),
        }
    }

    /// Connection string with the password masked, for logging
    pub fn connection_info(&self) -> String {
        let conn_str = self.connection_string();
        if let Some(at_pos) = conn_str.find('@') {
            if let Some(colon_pos) = conn_str[..at_pos].rfind(':') {
                let before_pass = &conn_str[..=colon_pos];
                let after_at = &conn_str[at_pos..];
                return format!("{before_pass}****{after_at}");
            }
        }
        conn_str
    }

    /// Whether the source lives in the DuckDB connection itself
    pub fn is_in_process(&self) -> bool {
        self.kind == SourceKind::Duckdb && self.connection_string() == ":memory:"
    }

    /// Load the scanner extension and attach the source read-only
    pub(crate) fn attach(&self, conn: &Connection) -> Result<()> {
        if self.is_in_process() {
            return Ok(());
        }
        let conn_str = self.connection_string().replace('\'', "''");
        let (extension, attach_type) = match self.kind {
            SourceKind::Postgres => (Some("postgres"), "TYPE POSTGRES, "),
            SourceKind::Mysql => (Some("mysql"), "TYPE MYSQL, "),
            SourceKind::Sqlite => (Some("sqlite"), "TYPE SQLITE, "),
            SourceKind::Duckdb => (None, ""),
        };

        if let Some(extension) = extension {
            conn.execute_batch(&format!("INSTALL {extension}; LOAD {extension};"))
                .map_err(|e| {
                    Error::config(format!("Failed to load {extension} extension: {e}"))
                })?;
        }
        conn.execute_batch(&format!(
            "ATTACH '{conn_str}' AS {SOURCE_CATALOG} ({attach_type}READ_ONLY);"
        ))
        .map_err(|e| Error::config(format!("Failed to attach {}: {e}", self.kind)))
    }
}
