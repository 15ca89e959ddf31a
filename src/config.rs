//! Configuration handling for the CSV loader.
//!
//! Connection settings come from the environment through clap `env` bindings, so
//! missing variables and malformed ports are rejected before any work starts.
//! Each variable also has a hidden long flag; the visible surface is only
//! `--filepath` and `--table`.

use crate::loader::LoadRequest;
use clap::{Args, Parser};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_REMOTE_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_LOCAL_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Command line interface.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "csv-tunnel-load",
    version,
    about = "Stream CSV data to PostgreSQL through an SSH tunnel"
)]
pub struct Cli {
    /// Path to the CSV file
    #[arg(long, value_name = "PATH")]
    pub filepath: PathBuf,

    /// Name of the table to insert data into (defaults to INSERT_TABLE)
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,

    #[command(flatten)]
    pub ssh: SshArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Table used when --table is omitted
    #[arg(long = "insert-table", env = "INSERT_TABLE", hide = true)]
    pub default_table: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SshArgs {
    #[arg(long = "ssh-host", env = "SSH_HOST", hide = true)]
    pub host: String,

    #[arg(long = "ssh-port", env = "SSH_PORT", hide = true)]
    pub port: u16,

    #[arg(long = "ssh-user", env = "SSH_USER", hide = true)]
    pub user: String,

    #[arg(long = "ssh-password", env = "SSH_PASSWORD", hide = true, hide_env_values = true)]
    pub password: String,

    /// Host the SSH server forwards database traffic to
    #[arg(
        long = "ssh-remote-bind-host",
        env = "SSH_REMOTE_BIND_HOST",
        default_value = DEFAULT_REMOTE_BIND_HOST,
        hide = true
    )]
    pub remote_bind_host: String,

    /// Local interface the tunnel listener binds to
    #[arg(
        long = "ssh-local-bind-host",
        env = "SSH_LOCAL_BIND_HOST",
        default_value = DEFAULT_LOCAL_BIND_HOST,
        hide = true
    )]
    pub local_bind_host: String,

    /// Expected SHA-256 fingerprint of the server host key
    #[arg(long = "ssh-host-key-fingerprint", env = "SSH_HOST_KEY_FINGERPRINT", hide = true)]
    pub host_key_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    #[arg(id = "db_host", long = "db-host", env = "DB_HOST", default_value = DEFAULT_DB_HOST, hide = true)]
    pub host: String,

    #[arg(id = "db_port", long = "db-port", env = "DB_PORT", default_value_t = DEFAULT_DB_PORT, hide = true)]
    pub port: u16,

    #[arg(id = "db_name", long = "db-name", env = "DB_NAME", hide = true)]
    pub name: String,

    #[arg(id = "db_user", long = "db-user", env = "DB_USER", hide = true)]
    pub user: String,

    #[arg(id = "db_password", long = "db-password", env = "DB_PASSWORD", hide = true, hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Clone, Args)]
pub struct LoggingArgs {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL, hide = true)]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long = "log-json", env = "LOG_JSON", hide = true)]
    pub json_logs: bool,
}

impl Cli {
    /// Split the parsed command line into immutable settings and the load request.
    pub fn into_parts(self) -> (Settings, LoadRequest) {
        let settings = Settings {
            ssh: SshConfig {
                host: self.ssh.host,
                port: self.ssh.port,
                user: self.ssh.user,
                password: self.ssh.password,
                remote_bind_host: self.ssh.remote_bind_host,
                local_bind_host: self.ssh.local_bind_host,
                host_key_fingerprint: self.ssh.host_key_fingerprint,
            },
            database: DatabaseConfig {
                host: self.database.host,
                port: self.database.port,
                name: self.database.name,
                user: self.database.user,
                password: self.database.password,
            },
            default_table: self.default_table,
        };
        let request = LoadRequest {
            filepath: self.filepath,
            table: self.table,
        };
        (settings, request)
    }
}

/// Everything the pipeline needs to reach the database. Built once per run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ssh: SshConfig,
    pub database: DatabaseConfig,
    pub default_table: Option<String>,
}

#[derive(Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Contains sensitive data - never log
    pub password: String,
    pub remote_bind_host: String,
    pub local_bind_host: String,
    pub host_key_fingerprint: Option<String>,
}

impl SshConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("remote_bind_host", &self.remote_bind_host)
            .field("local_bind_host", &self.local_bind_host)
            .field("host_key_fingerprint", &self.host_key_fingerprint)
            .finish()
    }
}

/// Database coordinates. `port` is the port on the far side of the tunnel; the
/// session itself connects to `host` on the tunnel's local port.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    /// Contains sensitive data - never log
    pub password: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
