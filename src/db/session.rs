//! Single-connection database session.
//!
//! A session owns one `PgConnection` for the lifetime of a load. Work runs
//! inside [`DatabaseSession::transaction`], which commits on success and rolls
//! back on failure; [`DatabaseSession::close`] then releases the connection.

use crate::config::DatabaseConfig;
use crate::error::{LoadError, LoadResult};
use futures_util::future::BoxFuture;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::{debug, error, info, warn};

const APPLICATION_NAME: &str = "csv-tunnel-load";

#[derive(Debug)]
pub struct DatabaseSession {
    conn: PgConnection,
}

impl DatabaseSession {
    /// Connect to the database listening on `local_port`, normally the local
    /// end of the SSH tunnel.
    pub async fn connect(config: &DatabaseConfig, local_port: u16) -> LoadResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(local_port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .application_name(APPLICATION_NAME);

        info!(
            host = %config.host,
            port = local_port,
            database = %config.name,
            user = %config.user,
            "Connecting to database"
        );

        Self::connect_with(&options).await
    }

    /// Connect with explicit options.
    pub async fn connect_with(options: &PgConnectOptions) -> LoadResult<Self> {
        let conn = PgConnection::connect_with(options)
            .await
            .map_err(connect_error)?;
        debug!("Database connection established");
        Ok(Self { conn })
    }

    /// Run `op` inside a transaction.
    ///
    /// Commits when `op` succeeds. When it fails the transaction is rolled
    /// back, the error is logged and then returned as-is.
    pub async fn transaction<F, T>(&mut self, op: F) -> LoadResult<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, LoadResult<T>>,
    {
        let mut tx = self.conn.begin().await.map_err(LoadError::from)?;

        match op(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(LoadError::from)?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                error!(error = %err, "Database operation error");
                Err(err)
            }
        }
    }

    /// Close the connection. Failures are logged, not returned.
    pub async fn close(self) {
        match self.conn.close().await {
            Ok(()) => debug!("Database connection closed"),
            Err(e) => warn!(error = %e, "Error while closing database connection"),
        }
    }
}

/// Server errors during startup (bad password, unknown database) are
/// connection failures, not SQL errors.
fn connect_error(err: sqlx::Error) -> LoadError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = match db_err.code() {
                Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                None => db_err.message().to_string(),
            };
            LoadError::connection(message, "Check DB_NAME, DB_USER and DB_PASSWORD")
        }
        other => LoadError::from(other),
    }
}
