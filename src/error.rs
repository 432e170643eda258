use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File vanished: {0}")]
    NotFound(PathBuf),

    #[error("Directories are not supported (yet): {0}")]
    Directory(PathBuf),

    #[error("Cannot determine media type of {path}: {reason}")]
    Classify { path: PathBuf, reason: String },

    #[error("Already claimed: {0}")]
    AlreadyClaimed(PathBuf),

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline task failed: {0}")]
    Task(String),

    #[error("Cancelled")]
    Cancelled,
}

impl IngestError {
    /// Wraps an I/O error, folding `NotFound` into the dedicated variant.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::NotFound {
            IngestError::NotFound(path)
        } else {
            IngestError::Io { path, source }
        }
    }

    /// Fatal errors stop the whole pipeline; everything else only drops a file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Watch(_) | IngestError::Config(_) | IngestError::Task(_)
        )
    }
}
