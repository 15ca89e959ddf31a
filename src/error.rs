//! Error types for the CSV loader.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants that have an obvious remedy carry a suggestion which the CLI prints
//! as a hint below the error message.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("SSH tunnel failed: {message}")]
    Tunnel { message: String, suggestion: String },

    #[error("SSH authentication failed for user '{user}'")]
    Authentication { user: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "22P04" for bad COPY file format
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Cannot read '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LoadError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an SSH tunnel error with a helpful suggestion.
    pub fn tunnel(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Tunnel {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an SSH authentication error.
    pub fn authentication(user: impl Into<String>) -> Self {
        Self::Authentication { user: user.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a file error for the given path.
    pub fn file(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::File {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Tunnel { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Authentication { .. } => Some("Check SSH_USER and SSH_PASSWORD"),
            _ => None,
        }
    }

    /// SQLSTATE reported by the server, for database errors.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to LoadError.
impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => LoadError::connection(
                msg.to_string(),
                "Check DB_NAME, DB_USER and DB_PASSWORD",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                LoadError::database(
                    db_err.message(),
                    code,
                    "Check that the CSV columns match the target table",
                )
            }
            sqlx::Error::Io(io_err) => LoadError::connection(
                format!("I/O error: {}", io_err),
                "Check that the tunnel is up and the database accepts connections on DB_PORT",
            ),
            sqlx::Error::Tls(tls_err) => LoadError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => LoadError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => LoadError::internal("Database worker crashed"),
            _ => LoadError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert russh errors to LoadError.
impl From<russh::Error> for LoadError {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::UnknownKey => LoadError::tunnel(
                "Server host key was rejected",
                "Check SSH_HOST_KEY_FINGERPRINT against the server's key",
            ),
            russh::Error::IO(io_err) => LoadError::tunnel(
                format!("I/O error: {}", io_err),
                "Check that SSH_HOST and SSH_PORT are reachable",
            ),
            russh::Error::ChannelOpenFailure(reason) => LoadError::tunnel(
                format!("Channel open failed: {:?}", reason),
                "Check that the SSH server allows TCP forwarding to the database port",
            ),
            other => LoadError::tunnel(
                other.to_string(),
                "Check the SSH server configuration",
            ),
        }
    }
}

/// Result type alias for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = LoadError::database(
            "extra data after last expected column",
            Some("22P04".to_string()),
            "Check CSV columns",
        );
        assert_eq!(err.suggestion(), Some("Check CSV columns"));
        assert_eq!(err.sql_state(), Some("22P04"));
    }

    #[test]
    fn test_config_error_has_no_suggestion() {
        let err = LoadError::config("no table");
        assert!(err.suggestion().is_none());
        assert!(err.sql_state().is_none());
    }

    #[test]
    fn test_file_error_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file");
        let err = LoadError::file("/tmp/missing.csv", io);
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.csv"));
        assert!(msg.contains("No such file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_authentication_error_mentions_user() {
        let err = LoadError::authentication("deploy");
        assert!(err.to_string().contains("'deploy'"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_sqlx_io_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: LoadError = sqlx::Error::Io(io).into();
        assert!(matches!(err, LoadError::Connection { .. }));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_sqlx_protocol_maps_to_connection() {
        let err: LoadError = sqlx::Error::Protocol("unexpected message".to_string()).into();
        assert!(matches!(err, LoadError::Connection { .. }));
    }

    #[test]
    fn test_russh_io_maps_to_tunnel() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: LoadError = russh::Error::IO(io).into();
        assert!(matches!(err, LoadError::Tunnel { .. }));
        assert!(err.to_string().starts_with("SSH tunnel failed"));
    }

    #[test]
    fn test_russh_unknown_key_maps_to_tunnel() {
        let err: LoadError = russh::Error::UnknownKey.into();
        assert!(matches!(err, LoadError::Tunnel { .. }));
        assert!(err.suggestion().unwrap().contains("SSH_HOST_KEY_FINGERPRINT"));
    }
}
