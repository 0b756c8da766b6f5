//! Report reduction errors

use genloop_archive::ArchiveError;
use std::path::{Path, PathBuf};

/// Typed failures of the report reduction engine
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report was not rewritten, or kept changing, within the timeout
    #[error("report update not observed at {path} within {waited_ms}ms")]
    UpdateNotObserved { path: PathBuf, waited_ms: u64 },

    /// File system failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Report content does not have the expected shape
    #[error("malformed report {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    /// Summary could not be archived
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl ReportError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &Path, detail: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}
