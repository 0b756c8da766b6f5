//! Error types for genloop core
//!
//! Two families:
//! - [`CapabilityError`]: faults raised by external capabilities, split into
//!   transient (retryable within the budget) and fatal
//! - [`CoreError`]: configuration and session-setup failures

use genloop_archive::ArchiveError;
use std::path::PathBuf;

/// Fault raised by a generation, check, analysis or repair capability
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// May succeed on another attempt
    #[error("transient capability fault: {0}")]
    Transient(String),

    /// Non-recoverable, the session must stop
    #[error("fatal capability fault: {0}")]
    Fatal(String),
}

impl CapabilityError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Short label used in `system_error` payloads
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transient(_) => "TransientFault",
            Self::Fatal(_) => "FatalFault",
        }
    }

    /// Underlying detail text
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Transient(d) | Self::Fatal(d) => d,
        }
    }
}

impl From<ArchiveError> for CapabilityError {
    fn from(err: ArchiveError) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Session setup and configuration errors
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// File system failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON document could not be decoded
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Archive or workspace failure
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl CoreError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(CapabilityError::Transient("rate limited".into()).is_retryable());
        assert!(!CapabilityError::Fatal("bad key".into()).is_retryable());
    }

    #[test]
    fn archive_errors_become_fatal() {
        let err: CapabilityError =
            ArchiveError::OutsideWorkspace(PathBuf::from("../x")).into();
        assert!(!err.is_retryable());
        assert!(err.detail().contains("../x"));
    }
}
