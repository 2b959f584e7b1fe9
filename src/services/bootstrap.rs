//! Idempotent database and extension setup.
//!
//! Both operations are safe to run on every startup. `CREATE DATABASE` cannot
//! run inside a transaction, so statements are issued on a plain connection
//! (autocommit) rather than through a pool transaction.

use serde::Serialize;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Executor};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::BootstrapError;
use crate::models::ConnectionParams;

/// SQLSTATE raised when another session created the database first.
const DUPLICATE_DATABASE: &str = "42P04";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionOutcome {
    Enabled,
    AlreadyEnabled,
}

/// Read-only view of what bootstrap would find.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapStatus {
    pub database: String,
    pub database_exists: bool,
    pub extension: String,
    pub extension_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub database: String,
    pub database_outcome: DatabaseOutcome,
    pub extension: String,
    pub extension_outcome: ExtensionOutcome,
}

/// Ensures the vector database and its extension exist.
#[derive(Debug, Clone)]
pub struct BootstrapManager {
    admin: ConnectionParams,
}

impl BootstrapManager {
    /// `admin` points at the administrative database (usually `postgres`).
    pub fn new(admin: ConnectionParams) -> Self {
        Self { admin }
    }

    /// Create `target_db` unless it already exists.
    pub async fn ensure_database_exists(
        &self,
        target_db: &str,
    ) -> Result<DatabaseOutcome, BootstrapError> {
        let mut conn = connect(&self.admin).await?;

        let exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1")
                .bind(target_db)
                .fetch_optional(&mut conn)
                .await
                .map_err(BootstrapError::QueryError)?;

        if exists.is_some() {
            debug!(database = target_db, "database already exists");
            close(conn).await;
            return Ok(DatabaseOutcome::AlreadyPresent);
        }

        let statement = format!("CREATE DATABASE {}", quote_ident(target_db));
        let result = conn.execute(statement.as_str()).await;
        close(conn).await;

        match result {
            Ok(_) => {
                info!(database = target_db, "created database");
                Ok(DatabaseOutcome::Created)
            }
            Err(e) if sqlstate(&e).as_deref() == Some(DUPLICATE_DATABASE) => {
                debug!(database = target_db, "database created concurrently");
                Ok(DatabaseOutcome::AlreadyPresent)
            }
            Err(source) => Err(BootstrapError::CreateDatabase {
                database: target_db.to_string(),
                source,
            }),
        }
    }

    /// Enable `extension` inside `target_db`. A no-op if already enabled.
    pub async fn ensure_extension_enabled(
        &self,
        target_db: &str,
        extension: &str,
    ) -> Result<ExtensionOutcome, BootstrapError> {
        let mut conn = connect(&self.admin.with_database(target_db)).await?;

        let enabled: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM pg_catalog.pg_extension WHERE extname = $1")
                .bind(extension)
                .fetch_optional(&mut conn)
                .await
                .map_err(BootstrapError::QueryError)?;

        let statement = format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(extension));
        let result = conn.execute(statement.as_str()).await;
        close(conn).await;

        result.map_err(|source| BootstrapError::EnableExtension {
            database: target_db.to_string(),
            extension: extension.to_string(),
            source,
        })?;

        if enabled.is_some() {
            debug!(database = target_db, extension, "extension already enabled");
            Ok(ExtensionOutcome::AlreadyEnabled)
        } else {
            info!(database = target_db, extension, "enabled extension");
            Ok(ExtensionOutcome::Enabled)
        }
    }

    /// Check both resources without creating anything.
    pub async fn inspect(
        &self,
        target_db: &str,
        extension: &str,
    ) -> Result<BootstrapStatus, BootstrapError> {
        let mut conn = connect(&self.admin).await?;
        let database_exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1")
                .bind(target_db)
                .fetch_optional(&mut conn)
                .await
                .map_err(BootstrapError::QueryError)?;
        close(conn).await;

        let extension_enabled = if database_exists.is_some() {
            let mut conn = connect(&self.admin.with_database(target_db)).await?;
            let row: Option<(i32,)> =
                sqlx::query_as("SELECT 1 FROM pg_catalog.pg_extension WHERE extname = $1")
                    .bind(extension)
                    .fetch_optional(&mut conn)
                    .await
                    .map_err(BootstrapError::QueryError)?;
            close(conn).await;
            row.is_some()
        } else {
            false
        };

        Ok(BootstrapStatus {
            database: target_db.to_string(),
            database_exists: database_exists.is_some(),
            extension: extension.to_string(),
            extension_enabled,
        })
    }

    /// Database first, then the extension inside it.
    pub async fn bootstrap(
        &self,
        target_db: &str,
        extension: &str,
    ) -> Result<BootstrapReport, BootstrapError> {
        let database_outcome = self.ensure_database_exists(target_db).await?;
        let extension_outcome = self.ensure_extension_enabled(target_db, extension).await?;

        Ok(BootstrapReport {
            database: target_db.to_string(),
            database_outcome,
            extension: extension.to_string(),
            extension_outcome,
        })
    }
}

async fn connect(params: &ConnectionParams) -> Result<PgConnection, BootstrapError> {
    debug!(target = %params, "connecting");
    match timeout(
        params.connect_timeout,
        PgConnection::connect_with(&params.connect_options()),
    )
    .await
    {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(source)) => Err(BootstrapError::ConnectionError {
            database: params.database.clone(),
            source,
        }),
        Err(_) => Err(BootstrapError::Timeout(params.database.clone())),
    }
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "error closing bootstrap connection");
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Double-quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_settings;
    use std::time::Duration;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("vectors"), "\"vectors\"");
        assert_eq!(quote_ident("My DB"), "\"My DB\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&DatabaseOutcome::AlreadyPresent).unwrap(),
            "\"already_present\""
        );
        assert_eq!(
            serde_json::to_string(&ExtensionOutcome::Enabled).unwrap(),
            "\"enabled\""
        );
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connection_error() {
        let mut admin = sample_settings().admin_connection();
        // Port 1 on loopback refuses connections.
        admin.port = 1;
        admin.connect_timeout = Duration::from_secs(2);

        let err = BootstrapManager::new(admin)
            .ensure_database_exists("vectors")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::ConnectionError { .. } | BootstrapError::Timeout(_)
        ));
    }
}
