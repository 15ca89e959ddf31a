//! CSV → PostgreSQL load pipeline.
//!
//! Resources are acquired in order (file, tunnel, connection, transaction)
//! and released in reverse. The tunnel is closed on every path once it has
//! been opened.

use crate::config::{DatabaseConfig, Settings};
use crate::db::{CopyStatement, DatabaseSession, TableName, copy_csv};
use crate::error::{LoadError, LoadResult};
use crate::source::CsvSource;
use crate::tunnel::Tunnel;
use humansize::{DECIMAL, format_size};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// What to load and where.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub filepath: PathBuf,
    /// Overrides the configured default table.
    pub table: Option<String>,
}

impl LoadRequest {
    /// Resolve the table to load into: the explicit table if given, otherwise
    /// the configured default.
    pub fn target_table(&self, settings: &Settings) -> LoadResult<TableName> {
        let raw = self
            .table
            .as_deref()
            .or(settings.default_table.as_deref())
            .ok_or_else(|| {
                LoadError::config("no target table: pass --table or set INSERT_TABLE")
            })?;
        TableName::parse(raw)
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: TableName,
    pub rows: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl std::fmt::Display for LoadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows ({}) into {} in {:.2}s",
            self.rows,
            format_size(self.bytes, DECIMAL),
            self.table,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Stream the CSV file named by `request` into PostgreSQL through the SSH
/// tunnel described by `settings`.
pub async fn stream_csv_to_postgres(
    settings: &Settings,
    request: &LoadRequest,
) -> LoadResult<LoadReport> {
    let started = Instant::now();
    let table = request.target_table(settings)?;
    let source = CsvSource::open(&request.filepath).await?;
    let bytes = source.size();

    info!(
        path = %request.filepath.display(),
        table = %table,
        size = %format_size(bytes, DECIMAL),
        "Streaming CSV to PostgreSQL"
    );

    let tunnel = Tunnel::open(&settings.ssh, &settings.database).await?;
    let outcome = load_through(
        &settings.database,
        tunnel.local_port(),
        CopyStatement::csv_with_header(table.clone()),
        source,
    )
    .await;
    if outcome.is_ok() {
        println!("Data has been successfully inserted into the PostgreSQL table.");
    }
    tunnel.close().await;
    let rows = outcome?;

    let report = LoadReport {
        table,
        rows,
        bytes,
        elapsed: started.elapsed(),
    };
    info!(
        table = %report.table,
        rows = report.rows,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Load complete"
    );
    Ok(report)
}

/// Connect through the tunnel's local port and run the COPY in a transaction.
pub async fn load_through(
    database: &DatabaseConfig,
    local_port: u16,
    statement: CopyStatement,
    source: CsvSource,
) -> LoadResult<u64> {
    let mut session = DatabaseSession::connect(database, local_port).await?;
    let reader = source.into_reader();
    let outcome = session
        .transaction(move |conn| Box::pin(copy_csv(conn, statement, reader)))
        .await;
    session.close().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SshConfig;

    fn settings(default_table: Option<&str>) -> Settings {
        Settings {
            ssh: SshConfig {
                host: "127.0.0.1".to_string(),
                port: 22,
                user: "deploy".to_string(),
                password: "s3cret".to_string(),
                remote_bind_host: "127.0.0.1".to_string(),
                local_bind_host: "127.0.0.1".to_string(),
                host_key_fingerprint: None,
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "warehouse".to_string(),
                user: "loader".to_string(),
                password: "hunter2".to_string(),
            },
            default_table: default_table.map(str::to_string),
        }
    }

    fn request(table: Option<&str>) -> LoadRequest {
        LoadRequest {
            filepath: PathBuf::from("data.csv"),
            table: table.map(str::to_string),
        }
    }

    #[test]
    fn test_default_table_used_without_override() {
        let table = request(None)
            .target_table(&settings(Some("people")))
            .unwrap();
        assert_eq!(table.as_str(), "people");
    }

    #[test]
    fn test_explicit_table_wins() {
        let table = request(Some("foo"))
            .target_table(&settings(Some("people")))
            .unwrap();
        assert_eq!(table.as_str(), "foo");
    }

    #[test]
    fn test_no_table_is_config_error() {
        let err = request(None).target_table(&settings(None)).unwrap_err();
        assert!(matches!(err, LoadError::Config { .. }));
        assert!(err.to_string().contains("INSERT_TABLE"));
    }

    #[test]
    fn test_invalid_table_rejected() {
        let err = request(Some("people; drop"))
            .target_table(&settings(None))
            .unwrap_err();
        assert!(matches!(err, LoadError::Config { .. }));
    }

    #[test]
    fn test_report_display() {
        let report = LoadReport {
            table: TableName::parse("people").unwrap(),
            rows: 2,
            bytes: 1_500,
            elapsed: Duration::from_millis(250),
        };
        let text = report.to_string();
        assert!(text.starts_with("2 rows ("));
        assert!(text.to_lowercase().contains("kb"));
        assert!(text.contains("into people"));
        assert!(text.ends_with("0.25s"));
    }
}
