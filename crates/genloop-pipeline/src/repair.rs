//! Build-failure repair sub-pipeline
//!
//! One cycle per build failure: analyze the diagnostic, apply a fix inside
//! the output workspace, rebuild once. The rebuild outcome is final.

use futures::FutureExt;
use genloop_core::{
    messages, Analyzer, BuildOutcome, Builder, CapabilityError, Fixer, PipelineContext,
    TelemetryEvent,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Events and final outcome of one repair cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RepairCycle {
    pub events: Vec<TelemetryEvent>,
    pub outcome: BuildOutcome,
}

/// Analyze, fix and rebuild
#[derive(Clone)]
pub struct RepairPipeline {
    analyzer: Arc<dyn Analyzer>,
    fixer: Arc<dyn Fixer>,
    builder: Arc<dyn Builder>,
}

impl RepairPipeline {
    pub fn new(analyzer: Arc<dyn Analyzer>, fixer: Arc<dyn Fixer>, builder: Arc<dyn Builder>) -> Self {
        Self {
            analyzer,
            fixer,
            builder,
        }
    }

    /// Run one cycle. Never fails: faults and panics become a fatal outcome
    /// preceded by a `system_error` event.
    pub async fn run(&self, diagnostic: &str, ctx: &PipelineContext) -> RepairCycle {
        let mut events = Vec::new();
        let attempt = AssertUnwindSafe(self.cycle(diagnostic, ctx, &mut events))
            .catch_unwind()
            .await;

        let fault = match attempt {
            Ok(Ok(outcome)) => return RepairCycle { events, outcome },
            Ok(Err(err)) => err.detail().to_owned(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        tracing::error!(%fault, "repair cycle failed");
        events.push(TelemetryEvent::system_error(
            messages::UNEXPECTED_ERROR_LABEL,
            fault.clone(),
        ));
        RepairCycle {
            events,
            outcome: BuildOutcome::FatalAbort(fault),
        }
    }

    async fn cycle(
        &self,
        diagnostic: &str,
        ctx: &PipelineContext,
        events: &mut Vec<TelemetryEvent>,
    ) -> Result<BuildOutcome, CapabilityError> {
        events.push(TelemetryEvent::agent_update(self.analyzer.name()));
        let analysis = self
            .analyzer
            .analyze(diagnostic, ctx)
            .await?
            .ok_or_else(|| CapabilityError::Fatal("analyzer produced no result".to_owned()))?;
        tracing::info!(
            confidence = ?analysis.confidence,
            files = analysis.files_to_fix.len(),
            "build error analyzed"
        );
        events.push(TelemetryEvent::AnalyzerResult(analysis.clone()));

        events.push(TelemetryEvent::agent_update(self.fixer.name()));
        let fixed = self.fixer.fix(&analysis, &ctx.workspace).await?;
        if !fixed.result {
            tracing::warn!(detail = %fixed.error_detail, "fixer reported failure, rebuilding anyway");
        }
        events.push(TelemetryEvent::AgentResult(fixed));

        let outcome = self.builder.build(ctx).await;
        events.push(TelemetryEvent::check_result(
            self.builder.name(),
            outcome.is_success(),
            format!("{} (rebuild)", self.builder.command()),
            outcome.diagnostic(),
        ));
        tracing::info!(success = outcome.is_success(), "rebuild finished");
        Ok(outcome)
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string() {
        let a: Box<dyn std::any::Any + Send> = Box::new("boom");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        let c: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(a.as_ref()), "boom");
        assert_eq!(panic_message(b.as_ref()), "bang");
        assert_eq!(panic_message(c.as_ref()), "panic");
    }
}
