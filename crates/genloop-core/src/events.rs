//! Telemetry events streamed to the observer
//!
//! Closed set of tagged variants, serialized as
//! `{"event": "<kind>", "payload": {...}}`. The observer rebuilds progress
//! from emission order alone.

use crate::report::TestResultPayload;
use crate::types::{AgentResult, AnalysisResult, DonePayload};
use serde::{Deserialize, Serialize};

/// `started` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedPayload {
    pub status: String,
    pub message: String,
    pub step_id: String,
}

/// `agent_update` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUpdatePayload {
    pub agent_name: String,
}

/// `code` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePayload {
    pub language: String,
    pub code: String,
    pub file_path: String,
}

/// `check_result` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResultPayload {
    pub checker: String,
    pub result: bool,
    pub rule_id: String,
    pub detail: String,
}

/// `test_screenshot` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotPayload {
    pub spec: String,
    pub filename: String,
    /// Path relative to the output root
    pub url: String,
    /// Written by the latest run
    pub updated: bool,
}

/// `system_error` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemErrorPayload {
    /// Short label, kept display-length bounded
    pub error: String,
    pub detail: String,
}

/// One ordered unit of observer-facing progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Started(StartedPayload),
    AgentUpdate(AgentUpdatePayload),
    #[serde(rename = "code")]
    ArtifactProduced(CodePayload),
    CheckResult(CheckResultPayload),
    TestResult(TestResultPayload),
    #[serde(rename = "test_screenshot")]
    ScreenshotProduced(ScreenshotPayload),
    AnalyzerResult(AnalysisResult),
    AgentResult(AgentResult),
    SystemError(SystemErrorPayload),
    Done(DonePayload),
}

impl TelemetryEvent {
    /// `started` event for a session
    pub fn started(step_id: impl Into<String>) -> Self {
        Self::Started(StartedPayload {
            status: "Started".to_owned(),
            message: "Started tasks".to_owned(),
            step_id: step_id.into(),
        })
    }

    pub fn agent_update(agent_name: impl Into<String>) -> Self {
        Self::AgentUpdate(AgentUpdatePayload {
            agent_name: agent_name.into(),
        })
    }

    pub fn check_result(
        checker: impl Into<String>,
        result: bool,
        rule_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::CheckResult(CheckResultPayload {
            checker: checker.into(),
            result,
            rule_id: rule_id.into(),
            detail: detail.into(),
        })
    }

    pub fn system_error(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SystemError(SystemErrorPayload {
            error: error.into(),
            detail: detail.into(),
        })
    }

    /// Wire name of this event
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::AgentUpdate(_) => "agent_update",
            Self::ArtifactProduced(_) => "code",
            Self::CheckResult(_) => "check_result",
            Self::TestResult(_) => "test_result",
            Self::ScreenshotProduced(_) => "test_screenshot",
            Self::AnalyzerResult(_) => "analyzer_result",
            Self::AgentResult(_) => "agent_result",
            Self::SystemError(_) => "system_error",
            Self::Done(_) => "done",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}
