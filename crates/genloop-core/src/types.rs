//! Core value types shared by every pipeline stage
//!
//! - Loop control: [`LoopAction`], [`ErrorClassification`]
//! - Verification outcomes: [`BuildOutcome`], [`CheckReport`]
//! - Capability products: [`GeneratedCode`], [`Artifact`], [`AnalysisResult`], [`AgentResult`]
//! - Terminal outcome: [`DonePayload`]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the orchestrator does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopAction {
    /// Continue with the next step of this iteration
    Proceed,
    /// Start the next iteration from the top
    Retry,
    /// Stop the session
    Terminate,
}

/// Error category currently driving loop branching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    #[default]
    None,
    StaticCheck,
    Build,
}

impl ErrorClassification {
    /// True when no error is active
    #[inline]
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

/// Result of a build or test verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    /// Worth another attempt; carries the diagnostic text
    RetryableFailure(String),
    /// Never retried
    FatalAbort(String),
}

impl BuildOutcome {
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalAbort(_))
    }

    /// Diagnostic text, empty on success
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::Success => "",
            Self::RetryableFailure(d) | Self::FatalAbort(d) => d,
        }
    }
}

/// One finding of a static check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIssue {
    pub rule_id: String,
    pub message: String,
    /// Human-readable rule description, used as a prompt fragment
    pub description: String,
}

/// Static check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckReport {
    Clean,
    Issues(Vec<CheckIssue>),
}

impl CheckReport {
    /// Build a report from a list, empty meaning clean
    #[must_use]
    pub fn from_issues(issues: Vec<CheckIssue>) -> Self {
        if issues.is_empty() {
            Self::Clean
        } else {
            Self::Issues(issues)
        }
    }
}

/// What a generation capability hands back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Path relative to the output workspace root
    pub relative_path: PathBuf,
    pub content: String,
    /// Language tag for display, e.g. `tsx`
    pub language: String,
}

impl GeneratedCode {
    pub fn new(
        relative_path: impl Into<PathBuf>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
            language: language.into(),
        }
    }
}

/// The most recently produced artifact of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub relative_path: PathBuf,
    pub content: String,
    pub language: String,
    /// Prompt that produced this artifact; `None` when loaded by an operator
    pub prompt: Option<String>,
}

impl Artifact {
    /// Artifact produced from `prompt`
    pub fn generated(code: GeneratedCode, prompt: impl Into<String>) -> Self {
        Self {
            relative_path: code.relative_path,
            content: code.content,
            language: code.language,
            prompt: Some(prompt.into()),
        }
    }

    /// Artifact substituted from local storage
    pub fn loaded(relative_path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let language = relative_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            relative_path,
            content: content.into(),
            language,
            prompt: None,
        }
    }
}

/// Confidence reported by the analysis capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Probable,
    Likely,
    Possible,
    Unclear,
}

/// Structured root-cause analysis of a build failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub root_cause: String,
    pub files_to_fix: Vec<String>,
    pub fix_policy: Vec<String>,
    pub confidence: Confidence,
}

/// Outcome reported by an agent-style capability (repair)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub result: bool,
    #[serde(default)]
    pub error_detail: String,
}

impl AgentResult {
    pub fn ok() -> Self {
        Self {
            result: true,
            error_detail: String::new(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            result: false,
            error_detail: detail.into(),
        }
    }
}

/// Terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoneStatus {
    Completed,
    Failed,
}

/// Stable terminal messages
pub mod messages {
    pub const ALL_TASKS_COMPLETED: &str = "All tasks completed";
    pub const STOPPED_AT_CHECKPOINT: &str = "Stopped at checkpoint";
    pub const RETRY_LIMIT_EXCEEDED: &str = "Retry limit exceeded";
    pub const INTERNAL_ERROR: &str = "Internal error occurred";
    pub const BUILD_FAILED: &str = "Build failed";
    pub const UNEXPECTED_ERROR: &str = "Unexpected error occurred";
    pub const CANCELLED: &str = "Cancelled";
    pub const TESTS_PASSED: &str = "Tests passed";
    pub const TESTS_FAILED: &str = "Tests failed";

    /// `system_error` label for faults caught at an outermost scope
    pub const UNEXPECTED_ERROR_LABEL: &str = "Unexpected Error";
}

/// Payload of the single terminal `done` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonePayload {
    pub status: DoneStatus,
    pub message: String,
}

impl DonePayload {
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: DoneStatus::Completed,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: DoneStatus::Failed,
            message: message.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == DoneStatus::Completed
    }
}
