//! Database access layer.
//!
//! - Single-connection session with commit/rollback scoping
//! - COPY FROM STDIN streaming and target table validation

pub mod copy;
pub mod session;

pub use copy::{CopyStatement, TableName, copy_csv};
pub use session::DatabaseSession;
