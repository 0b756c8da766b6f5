//! Uniform outcome of one pipeline step

use crate::events::TelemetryEvent;
use crate::types::{DonePayload, LoopAction};

/// What a step did and what the orchestrator should do next
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub action: LoopAction,
    /// Emitted in order, before any terminal event
    pub events: Vec<TelemetryEvent>,
    /// Set only when `action` is `Terminate`
    pub outcome: Option<DonePayload>,
    /// Replacement base prompt for the next iteration
    pub next_prompt: Option<String>,
}

impl StepResult {
    pub fn proceed(events: Vec<TelemetryEvent>) -> Self {
        Self {
            action: LoopAction::Proceed,
            events,
            outcome: None,
            next_prompt: None,
        }
    }

    pub fn retry(events: Vec<TelemetryEvent>) -> Self {
        Self {
            action: LoopAction::Retry,
            events,
            outcome: None,
            next_prompt: None,
        }
    }

    pub fn terminate(events: Vec<TelemetryEvent>, outcome: DonePayload) -> Self {
        Self {
            action: LoopAction::Terminate,
            events,
            outcome: Some(outcome),
            next_prompt: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_next_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_prompt = Some(prompt.into());
        self
    }
}
