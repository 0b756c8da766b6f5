//! Step wrappers
//!
//! Each step invokes one capability, folds every fault it can raise into a
//! [`StepResult`], and updates the context classification. Steps never emit
//! telemetry themselves; the orchestrator forwards `StepResult::events` in
//! order.

use crate::prompt::build_error_prompt;
use crate::repair::RepairPipeline;
use genloop_core::{
    messages, Artifact, BuildOutcome, Builder, CapabilityError, CheckReport, CodePayload,
    DonePayload, ErrorClassification, Generator, PipelineContext, PromptTemplates,
    StaticChecker, StepResult, TelemetryEvent,
};

/// Archive bucket for overwritten artifacts, under the session directory
pub const GEN_CODE_BUCKET: &str = "gen_code";

/// How a retryable build failure is followed up
pub enum BuildFollowUp<'a> {
    /// Regenerate from a prompt synthesized from the artifact and diagnostic
    Reprompt(&'a PromptTemplates),
    /// One analyze, fix and rebuild cycle whose outcome is final
    Repair(&'a RepairPipeline),
}

/// Position of the current iteration within the retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    pub index: u32,
    pub limit: u32,
}

impl Iteration {
    #[inline]
    #[must_use]
    pub fn is_last(self) -> bool {
        self.index + 1 >= self.limit
    }
}

/// Fold a capability fault into a step result
pub(crate) fn capability_fault(
    mut events: Vec<TelemetryEvent>,
    err: &CapabilityError,
    iteration: Iteration,
) -> StepResult {
    events.push(TelemetryEvent::system_error(err.label(), err.detail()));
    match err {
        CapabilityError::Transient(_) if !iteration.is_last() => {
            tracing::warn!(iteration = iteration.index, error = %err, "transient fault, retrying");
            StepResult::retry(events)
        }
        CapabilityError::Transient(_) => {
            tracing::error!(iteration = iteration.index, error = %err, "transient fault on last iteration");
            StepResult::terminate(events, DonePayload::failed(messages::RETRY_LIMIT_EXCEEDED))
        }
        CapabilityError::Fatal(_) => {
            tracing::error!(iteration = iteration.index, error = %err, "fatal capability fault");
            StepResult::terminate(events, DonePayload::failed(messages::INTERNAL_ERROR))
        }
    }
}

fn internal_error(mut events: Vec<TelemetryEvent>, error: &str, detail: String) -> StepResult {
    tracing::error!(%error, %detail, "step failed");
    events.push(TelemetryEvent::system_error(error, detail));
    StepResult::terminate(events, DonePayload::failed(messages::INTERNAL_ERROR))
}

/// Produce an artifact and persist it into the output workspace
pub async fn generate_step(
    generator: &dyn Generator,
    prompt: &str,
    ctx: &mut PipelineContext,
    iteration: Iteration,
) -> StepResult {
    tracing::info!(iteration = iteration.index, generator = generator.name(), "generate");
    let mut events = vec![TelemetryEvent::agent_update(generator.name())];

    let code = match generator.generate(prompt, ctx).await {
        Ok(code) => code,
        Err(err) => return capability_fault(events, &err, iteration),
    };

    let record = match ctx
        .workspace
        .write_file(&code.relative_path, &code.content, GEN_CODE_BUCKET)
    {
        Ok(record) => record,
        Err(err) => return internal_error(events, "Write Error", err.to_string()),
    };
    if let Some(backup) = &record.backup {
        tracing::debug!(backup = %backup.display(), "previous artifact archived");
    }

    events.push(TelemetryEvent::ArtifactProduced(CodePayload {
        language: code.language.clone(),
        code: code.content.clone(),
        file_path: code.relative_path.display().to_string(),
    }));
    ctx.artifact = Some(Artifact::generated(code, prompt));
    StepResult::proceed(events)
}

/// Static check of the current artifact
///
/// Issues turn into guidance fragments for the next prompt.
pub async fn check_step(
    checker: &dyn StaticChecker,
    ctx: &mut PipelineContext,
    iteration: Iteration,
) -> StepResult {
    let Some(path) = ctx.artifact_path() else {
        return internal_error(Vec::new(), "Missing Artifact", "no artifact to check".to_owned());
    };
    tracing::info!(iteration = iteration.index, path = %path.display(), "static check");

    let report = match checker.check(&path).await {
        Ok(report) => report,
        Err(err) => return capability_fault(Vec::new(), &err, iteration),
    };

    match report {
        CheckReport::Clean => {
            ctx.classification = ErrorClassification::None;
            StepResult::proceed(vec![TelemetryEvent::check_result(checker.name(), true, "", "")])
        }
        CheckReport::Issues(issues) => {
            ctx.classification = ErrorClassification::StaticCheck;
            let mut events = Vec::with_capacity(issues.len());
            for issue in &issues {
                events.push(TelemetryEvent::check_result(
                    checker.name(),
                    false,
                    issue.rule_id.clone(),
                    issue.message.clone(),
                ));
                ctx.add_supplementary(&issue.description);
            }
            tracing::warn!(
                iteration = iteration.index,
                issues = issues.len(),
                fragments = ctx.supplementary_prompts().len(),
                "static check found issues"
            );
            StepResult::retry(events)
        }
    }
}

/// Build verification, with the configured follow-up on a retryable failure
pub async fn build_step(
    builder: &dyn Builder,
    follow_up: BuildFollowUp<'_>,
    ctx: &mut PipelineContext,
) -> StepResult {
    tracing::info!(builder = builder.name(), "build");
    let outcome = builder.build(ctx).await;
    let mut events = vec![TelemetryEvent::check_result(
        builder.name(),
        outcome.is_success(),
        if outcome.is_success() { "" } else { builder.command() },
        outcome.diagnostic(),
    )];

    match outcome {
        BuildOutcome::Success => {
            ctx.classification = ErrorClassification::None;
            StepResult::proceed(events)
        }
        BuildOutcome::FatalAbort(diagnostic) => {
            tracing::error!(%diagnostic, "build aborted");
            ctx.classification = ErrorClassification::Build;
            StepResult::terminate(events, DonePayload::failed(messages::BUILD_FAILED))
        }
        BuildOutcome::RetryableFailure(diagnostic) => {
            ctx.classification = ErrorClassification::Build;
            match follow_up {
                BuildFollowUp::Reprompt(templates) => {
                    let source = ctx
                        .artifact
                        .as_ref()
                        .map(|a| a.content.as_str())
                        .unwrap_or_default();
                    tracing::warn!("build failed, reprompting");
                    StepResult::retry(events)
                        .with_next_prompt(build_error_prompt(templates, source, &diagnostic))
                }
                BuildFollowUp::Repair(repair) => {
                    tracing::warn!("build failed, running repair");
                    let cycle = repair.run(&diagnostic, ctx).await;
                    events.extend(cycle.events);
                    if cycle.outcome.is_success() {
                        ctx.classification = ErrorClassification::None;
                        StepResult::proceed(events)
                    } else {
                        tracing::error!(diagnostic = cycle.outcome.diagnostic(), "repair did not recover the build");
                        StepResult::terminate(events, DonePayload::failed(messages::BUILD_FAILED))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_iteration_is_limit_minus_one() {
        assert!(!Iteration { index: 0, limit: 3 }.is_last());
        assert!(!Iteration { index: 1, limit: 3 }.is_last());
        assert!(Iteration { index: 2, limit: 3 }.is_last());
        assert!(Iteration { index: 0, limit: 1 }.is_last());
    }

    #[test]
    fn transient_fault_retries_before_the_last_iteration() {
        let err = CapabilityError::Transient("rate limited".into());
        let early = capability_fault(Vec::new(), &err, Iteration { index: 0, limit: 2 });
        assert_eq!(early.action, genloop_core::LoopAction::Retry);
        assert_eq!(early.events.len(), 1);

        let last = capability_fault(Vec::new(), &err, Iteration { index: 1, limit: 2 });
        assert_eq!(
            last.outcome,
            Some(DonePayload::failed(messages::RETRY_LIMIT_EXCEEDED))
        );
    }

    #[test]
    fn fatal_fault_terminates_immediately() {
        let err = CapabilityError::Fatal("bad key".into());
        let res = capability_fault(Vec::new(), &err, Iteration { index: 0, limit: 5 });
        assert_eq!(res.outcome, Some(DonePayload::failed(messages::INTERNAL_ERROR)));
        assert_eq!(
            res.events,
            vec![TelemetryEvent::system_error("FatalFault", "bad key")]
        );
    }
}
