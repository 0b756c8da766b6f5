//! genloop core
//!
//! Data model shared by every stage of the generate, verify and repair loop:
//! - [`PipelineContext`]: mutable single-session state
//! - [`StepResult`] and [`LoopAction`]: explicit loop control
//! - [`TelemetryEvent`]: closed set of observer-facing events
//! - Capability traits: [`Generator`], [`StaticChecker`], [`Builder`],
//!   [`Analyzer`], [`Fixer`]
//! - [`GenloopConfig`]: TOML configuration

#![allow(missing_docs)]

pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod report;
pub mod step;
pub mod types;

pub use capability::{Analyzer, Builder, Fixer, Generator, StaticChecker};
pub use config::{
    BuildFailureStrategy, CommandSpec, CommandsConfig, GenloopConfig, LoggingConfig,
    PipelineConfig, PromptTemplates, ResultsLayout, RunnerConfig, WorkspaceConfig,
    DEFAULT_CONFIG_FILE,
};
pub use context::{PipelineContext, StepId};
pub use error::{CapabilityError, CoreError};
pub use events::{
    AgentUpdatePayload, CheckResultPayload, CodePayload, ScreenshotPayload, StartedPayload,
    SystemErrorPayload, TelemetryEvent,
};
pub use report::{TestResultPayload, TestSpecResult, TestSuiteResult};
pub use step::StepResult;
pub use types::{
    messages, AgentResult, AnalysisResult, Artifact, BuildOutcome, CheckIssue, CheckReport,
    Confidence, DonePayload, DoneStatus, ErrorClassification, GeneratedCode, LoopAction,
};

/// Re-exported so capability implementors share one `Workspace` type
pub use genloop_archive::Workspace;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for implementing capabilities and steps
    pub use crate::{
        Analyzer, BuildOutcome, Builder, CapabilityError, CheckReport, DonePayload, Fixer,
        GeneratedCode, Generator, PipelineContext, StaticChecker, StepResult, TelemetryEvent,
        Workspace,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
