//! COPY FROM STDIN support.
//!
//! The target table name is interpolated into the statement, so it is
//! validated as a plain (optionally schema-qualified) identifier first. It is
//! left unquoted so Postgres folds its case exactly as it would in psql.

use crate::error::{LoadError, LoadResult};
use crate::source::Utf8Reader;
use sqlx::PgConnection;
use std::fmt;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

/// Validated target table, `name` or `schema.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(raw: &str) -> LoadResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LoadError::config("table name is empty"));
        }
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() > 2 {
            return Err(LoadError::config(format!(
                "table name '{}' has too many parts; use table or schema.table",
                raw
            )));
        }
        for part in &parts {
            validate_identifier(part).map_err(|reason| {
                LoadError::config(format!("invalid table name '{}': {}", raw, reason))
            })?;
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_identifier(part: &str) -> Result<(), &'static str> {
    let mut chars = part.chars();
    let Some(first) = chars.next() else {
        return Err("empty identifier");
    };
    if !is_ident_start(first) || !chars.all(is_ident_continue) {
        return Err(
            "identifiers must be alphanumeric or underscore and start with a letter or underscore",
        );
    }
    // NAMEDATALEN - 1
    if part.len() > 63 {
        return Err("identifier longer than 63 bytes");
    }
    Ok(())
}

fn is_ident_start(value: char) -> bool {
    value == '_' || value.is_ascii_alphabetic()
}

fn is_ident_continue(value: char) -> bool {
    is_ident_start(value) || value.is_ascii_digit() || value == '$'
}

/// `COPY <table> FROM STDIN` for comma-delimited CSV with a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStatement {
    table: TableName,
}

impl CopyStatement {
    pub fn csv_with_header(table: TableName) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn to_sql(&self) -> String {
        format!("COPY {} FROM STDIN WITH CSV HEADER DELIMITER ','", self.table)
    }
}

/// Stream `source` into the table through COPY on `conn`.
///
/// Returns the number of rows the server reports as copied. If reading the
/// source fails the COPY is aborted so the server discards the partial data;
/// the caller's transaction is still responsible for rolling back.
pub async fn copy_csv<R>(
    conn: &mut PgConnection,
    statement: CopyStatement,
    mut source: Utf8Reader<R>,
) -> LoadResult<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let sql = statement.to_sql();
    debug!(sql = %sql, "Starting COPY");

    let mut copy = conn.copy_in_raw(&sql).await?;

    let streamed = copy.read_from(&mut source).await.map(|_| ());
    if let Err(err) = streamed {
        let err = read_error(err);
        if let Err(abort_err) = copy.abort(err.to_string()).await {
            // The server answers CopyFail with an error; only unexpected ones matter.
            warn!(error = %abort_err, "COPY abort did not complete cleanly");
        }
        return Err(err);
    }

    let rows = copy.finish().await?;
    debug!(
        table = %statement.table(),
        rows,
        bytes = source.bytes_read(),
        "COPY finished"
    );
    Ok(rows)
}

/// Source read failures surface from sqlx as I/O errors; report bad encoding
/// as bad input rather than a connection problem.
fn read_error(err: sqlx::Error) -> LoadError {
    match err {
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::InvalidData => {
            LoadError::invalid_input(format!("CSV file is not valid UTF-8: {}", io))
        }
        other => LoadError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_sql() {
        let statement = CopyStatement::csv_with_header(TableName::parse("people").unwrap());
        assert_eq!(
            statement.to_sql(),
            "COPY people FROM STDIN WITH CSV HEADER DELIMITER ','"
        );
    }

    #[test]
    fn test_schema_qualified_table() {
        let table = TableName::parse("staging.people_2024").unwrap();
        assert_eq!(table.as_str(), "staging.people_2024");
        let statement = CopyStatement::csv_with_header(table);
        assert!(statement.to_sql().starts_with("COPY staging.people_2024 FROM STDIN"));
    }

    #[test]
    fn test_table_name_trimmed() {
        assert_eq!(TableName::parse("  people ").unwrap().as_str(), "people");
    }

    #[test]
    fn test_table_name_rejects_injection() {
        assert!(TableName::parse("people; DROP TABLE people").is_err());
        assert!(TableName::parse("people(id)").is_err());
        assert!(TableName::parse("\"People\"").is_err());
    }

    #[test]
    fn test_table_name_rejects_malformed() {
        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("1people").is_err());
        assert!(TableName::parse("a.b.c").is_err());
        assert!(TableName::parse("schema.").is_err());
        assert!(TableName::parse(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_table_name_error_is_config() {
        let err = TableName::parse("bad-name").unwrap_err();
        assert!(matches!(err, LoadError::Config { .. }));
        assert!(err.to_string().contains("bad-name"));
    }

    #[test]
    fn test_invalid_data_read_error_is_invalid_input() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad byte");
        let err = read_error(sqlx::Error::Io(io));
        assert!(matches!(err, LoadError::InvalidInput { .. }));
    }

    #[test]
    fn test_other_read_error_is_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err = read_error(sqlx::Error::Io(io));
        assert!(matches!(err, LoadError::Connection { .. }));
    }
}
