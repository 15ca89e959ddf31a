//! Local CSV input.
//!
//! The file is never parsed here: Postgres interprets rows server-side during
//! COPY. This module only opens the file and wraps it so its bytes are checked
//! for UTF-8 validity while they stream.

pub mod utf8;

pub use utf8::Utf8Reader;

use crate::error::{LoadError, LoadResult};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::debug;

/// An opened CSV file ready to be streamed.
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    file: File,
    size: u64,
}

impl CsvSource {
    /// Open a CSV file for reading.
    pub async fn open(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| LoadError::file(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| LoadError::file(path, e))?;
        if metadata.is_dir() {
            return Err(LoadError::file(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory"),
            ));
        }

        debug!(path = %path.display(), size = metadata.len(), "Opened CSV source");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consume the source, yielding a UTF-8 checking reader over the file.
    pub fn into_reader(self) -> Utf8Reader<File> {
        Utf8Reader::new(self.file)
    }
}
