//! Pipeline errors
//!
//! Only faults that cannot be expressed as a [`StepResult`] surface here.
//! Capability faults and verification failures never do.
//!
//! [`StepResult`]: genloop_core::StepResult

use genloop_archive::ArchiveError;
use genloop_core::CoreError;
use genloop_report::ReportError;
use genloop_runner::RunnerError;
use std::path::PathBuf;

/// Errors raised outside the step contract
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Session setup or configuration
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Workspace write or archive
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Test runner infrastructure
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Report reduction
    #[error(transparent)]
    Report(#[from] ReportError),

    /// A `{{file:...}}` placeholder names a file that does not exist
    #[error("prompt references missing file: {0}")]
    MissingPromptFile(PathBuf),

    /// Telemetry observer went away
    #[error("telemetry sink closed")]
    SinkClosed,

    /// Checkpoint console input failed
    #[error("checkpoint input failed: {0}")]
    Checkpoint(String),
}
