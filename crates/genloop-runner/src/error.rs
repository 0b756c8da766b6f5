//! Runner errors

use genloop_archive::ArchiveError;

/// Infrastructure faults of the test execution runner
///
/// Verification results (pass, fail, abort) are not errors; they are
/// reported as a [`BuildOutcome`](genloop_core::BuildOutcome).
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Test-runner process could not be started
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading output or waiting on the process failed
    #[error("io error while running tests: {0}")]
    Io(#[from] std::io::Error),

    /// Report or info file could not be archived
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
