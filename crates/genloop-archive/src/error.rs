//! Error types for archiving and workspace file access

use std::path::{Path, PathBuf};

/// Errors raised while archiving or writing workspace files
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The file to archive does not exist
    #[error("archive source not found: {0}")]
    SourceMissing(PathBuf),

    /// Underlying I/O failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A relative path resolved outside of the workspace root
    #[error("path escapes workspace root: {0}")]
    OutsideWorkspace(PathBuf),
}

impl ArchiveError {
    /// Create IO error for path
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
