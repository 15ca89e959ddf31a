//! CSV Tunnel Load Library
//!
//! Streams a local CSV file into a PostgreSQL table over an SSH tunnel using
//! `COPY ... FROM STDIN`, committing on success and rolling back on failure.

pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod source;
pub mod tunnel;

pub use config::{Cli, Settings};
pub use error::{LoadError, LoadResult};
pub use loader::{LoadReport, LoadRequest, stream_csv_to_postgres};
