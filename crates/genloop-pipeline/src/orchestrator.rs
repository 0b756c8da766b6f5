//! Retry orchestrator
//!
//! Drives generate, static check and build for up to `retry_limit`
//! iterations and reports exactly one terminal outcome per session.
//!
//! Per iteration:
//! - inline `{{file:...}}` references once, before the first iteration
//! - compose the prompt from the base prompt and accumulated guidance
//! - generate; transient faults retry, fatal faults terminate
//! - static check; issues add guidance and retry without building
//! - build (when requested and nothing is outstanding); success ends the
//!   session, a retryable failure reprompts or runs one repair cycle
//!
//! Capability faults are folded into step results where they happen. Anything
//! else, panics included, is caught at [`Orchestrator::run`].

use crate::checkpoint::{Checkpoint, CheckpointCommand, CheckpointControl};
use crate::error::PipelineError;
use crate::prompt::{compose_prompt, expand_file_placeholders};
use crate::repair::{panic_message, RepairPipeline};
use crate::steps::{build_step, check_step, generate_step, BuildFollowUp, Iteration, GEN_CODE_BUCKET};
use crate::telemetry::TelemetrySink;
use futures::FutureExt;
use genloop_core::{
    messages, Artifact, BuildFailureStrategy, Builder, CodePayload, DonePayload,
    ErrorClassification, Generator, LoopAction, PipelineContext, PromptTemplates,
    StaticChecker, StepResult, TelemetryEvent,
};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

/// What the loop does after a step has been applied
enum Next {
    Proceed,
    Retry,
    Done(DonePayload),
}

/// What a checkpoint lets through
enum Gate {
    Run,
    Skip,
    /// Artifact substituted by the operator
    Loaded,
    Stop(DonePayload),
}

/// Generate, verify and repair state machine
///
/// Capabilities are injected once at construction and shared across
/// sessions; all per-session state lives in [`PipelineContext`].
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    checker: Arc<dyn StaticChecker>,
    builder: Arc<dyn Builder>,
    repair: Option<RepairPipeline>,
    strategy: BuildFailureStrategy,
    templates: PromptTemplates,
    checkpoints: Option<Arc<dyn CheckpointControl>>,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        checker: Arc<dyn StaticChecker>,
        builder: Arc<dyn Builder>,
    ) -> Self {
        Self {
            generator,
            checker,
            builder,
            repair: None,
            strategy: BuildFailureStrategy::default(),
            templates: PromptTemplates::default(),
            checkpoints: None,
        }
    }

    /// Install a repair pipeline and switch to the repair strategy
    #[inline]
    #[must_use]
    pub fn with_repair(mut self, repair: RepairPipeline) -> Self {
        self.repair = Some(repair);
        self.strategy = BuildFailureStrategy::Repair;
        self
    }

    /// Without a repair pipeline, `Repair` falls back to reprompting
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: BuildFailureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_checkpoints(mut self, control: Arc<dyn CheckpointControl>) -> Self {
        self.checkpoints = Some(control);
        self
    }

    #[must_use]
    pub fn strategy(&self) -> BuildFailureStrategy {
        self.strategy
    }

    /// Run one session to its terminal outcome.
    ///
    /// Emits `started`, the step events in execution order and exactly one
    /// `done`, whose payload is also returned.
    pub async fn run(
        &self,
        base_prompt: &str,
        ctx: &mut PipelineContext,
        sink: &dyn TelemetrySink,
    ) -> DonePayload {
        let attempt = AssertUnwindSafe(self.drive(base_prompt, ctx, sink))
            .catch_unwind()
            .await;

        let outcome = match attempt {
            Ok(Ok(done)) => done,
            Ok(Err(err)) => self.unexpected(sink, err.to_string()).await,
            Err(panic) => self.unexpected(sink, panic_message(panic.as_ref())).await,
        };

        tracing::info!(
            step_id = %ctx.step_id,
            status = ?outcome.status,
            message = %outcome.message,
            "session finished"
        );
        emit(sink, TelemetryEvent::Done(outcome.clone())).await;
        outcome
    }

    async fn unexpected(&self, sink: &dyn TelemetrySink, detail: String) -> DonePayload {
        tracing::error!(%detail, "unexpected error");
        emit(
            sink,
            TelemetryEvent::system_error(messages::UNEXPECTED_ERROR_LABEL, detail),
        )
        .await;
        DonePayload::failed(messages::UNEXPECTED_ERROR)
    }

    async fn drive(
        &self,
        base_prompt: &str,
        ctx: &mut PipelineContext,
        sink: &dyn TelemetrySink,
    ) -> Result<DonePayload, PipelineError> {
        emit(sink, TelemetryEvent::started(ctx.step_id.as_str())).await;
        let mut base = match expand_file_placeholders(base_prompt, &ctx.workspace) {
            Ok(prompt) => prompt,
            Err(PipelineError::MissingPromptFile(path)) => {
                tracing::error!(path = %path.display(), "prompt references a missing file");
                emit(
                    sink,
                    TelemetryEvent::system_error("Missing File", path.display().to_string()),
                )
                .await;
                return Ok(DonePayload::failed(messages::INTERNAL_ERROR));
            }
            Err(err) => return Err(err),
        };

        for index in 0..ctx.retry_limit {
            let iteration = Iteration {
                index,
                limit: ctx.retry_limit,
            };
            let prompt = compose_prompt(&base, ctx.supplementary_prompts());
            tracing::info!(
                iteration = index,
                limit = ctx.retry_limit,
                fragments = ctx.supplementary_prompts().len(),
                "iteration start"
            );

            // Generate
            match self.checkpoint(Checkpoint::BeforeGenerate, ctx, sink).await? {
                Gate::Stop(done) => return Ok(done),
                Gate::Skip | Gate::Loaded => {
                    tracing::debug!(iteration = index, "generation bypassed");
                }
                Gate::Run => {
                    if let Some(done) = cancelled(sink) {
                        return Ok(done);
                    }
                    let step = generate_step(self.generator.as_ref(), &prompt, ctx, iteration).await;
                    match apply(step, &mut base, iteration, sink).await {
                        Next::Proceed => {}
                        Next::Retry => continue,
                        Next::Done(done) => return Ok(done),
                    }
                }
            }

            // Static check
            match self.checkpoint(Checkpoint::BeforeCheck, ctx, sink).await? {
                Gate::Stop(done) => return Ok(done),
                Gate::Skip => ctx.classification = ErrorClassification::None,
                Gate::Run | Gate::Loaded => {
                    if let Some(done) = cancelled(sink) {
                        return Ok(done);
                    }
                    let step = check_step(self.checker.as_ref(), ctx, iteration).await;
                    match apply(step, &mut base, iteration, sink).await {
                        Next::Proceed => {}
                        Next::Retry => continue,
                        Next::Done(done) => return Ok(done),
                    }
                }
            }

            // Build
            if ctx.build_check && ctx.classification.is_none() {
                match self.checkpoint(Checkpoint::BeforeBuild, ctx, sink).await? {
                    Gate::Stop(done) => return Ok(done),
                    Gate::Skip => {}
                    Gate::Run | Gate::Loaded => {
                        if let Some(done) = cancelled(sink) {
                            return Ok(done);
                        }
                        let step =
                            build_step(self.builder.as_ref(), self.follow_up(), ctx).await;
                        match apply(step, &mut base, iteration, sink).await {
                            Next::Proceed => {}
                            Next::Retry => continue,
                            Next::Done(done) => return Ok(done),
                        }
                    }
                }
            }

            tracing::info!(iteration = index, "all checks passed");
            return Ok(DonePayload::completed(messages::ALL_TASKS_COMPLETED));
        }

        Ok(DonePayload::failed(messages::RETRY_LIMIT_EXCEEDED))
    }

    fn follow_up(&self) -> BuildFollowUp<'_> {
        match (&self.strategy, &self.repair) {
            (BuildFailureStrategy::Repair, Some(repair)) => BuildFollowUp::Repair(repair),
            (BuildFailureStrategy::Repair, None) => {
                tracing::warn!("repair strategy without a repair pipeline, reprompting");
                BuildFollowUp::Reprompt(&self.templates)
            }
            (BuildFailureStrategy::Reprompt, _) => BuildFollowUp::Reprompt(&self.templates),
        }
    }

    async fn checkpoint(
        &self,
        at: Checkpoint,
        ctx: &mut PipelineContext,
        sink: &dyn TelemetrySink,
    ) -> Result<Gate, PipelineError> {
        let Some(control) = &self.checkpoints else {
            return Ok(Gate::Run);
        };

        Ok(match control.await_command(at, ctx).await? {
            CheckpointCommand::Continue => Gate::Run,
            CheckpointCommand::Skip => Gate::Skip,
            CheckpointCommand::End => {
                tracing::info!(checkpoint = %at, "stopped by operator");
                Gate::Stop(DonePayload::completed(messages::STOPPED_AT_CHECKPOINT))
            }
            CheckpointCommand::Load { source, dest } => {
                load_artifact(&source, &dest, ctx, sink).await?;
                Gate::Loaded
            }
        })
    }
}

/// Forward a step's events, then translate its action
async fn apply(
    step: StepResult,
    base: &mut String,
    iteration: Iteration,
    sink: &dyn TelemetrySink,
) -> Next {
    for event in step.events {
        emit(sink, event).await;
    }

    match step.action {
        LoopAction::Proceed => Next::Proceed,
        LoopAction::Retry => {
            if let Some(prompt) = step.next_prompt {
                *base = prompt;
            }
            if iteration.is_last() {
                tracing::error!(iteration = iteration.index, "retry limit exceeded");
                Next::Done(DonePayload::failed(messages::RETRY_LIMIT_EXCEEDED))
            } else {
                Next::Retry
            }
        }
        LoopAction::Terminate => Next::Done(
            step.outcome
                .unwrap_or_else(|| DonePayload::failed(messages::INTERNAL_ERROR)),
        ),
    }
}

fn cancelled(sink: &dyn TelemetrySink) -> Option<DonePayload> {
    if sink.is_closed() {
        tracing::warn!("observer disconnected, stopping");
        Some(DonePayload::failed(messages::CANCELLED))
    } else {
        None
    }
}

async fn emit(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    let kind = event.kind();
    if let Err(err) = sink.emit(event).await {
        tracing::debug!(kind, error = %err, "event dropped");
    }
}

/// Copy an operator-supplied file into the workspace as the current artifact
async fn load_artifact(
    source: &Path,
    dest: &Path,
    ctx: &mut PipelineContext,
    sink: &dyn TelemetrySink,
) -> Result<(), PipelineError> {
    let content = tokio::fs::read_to_string(source).await.map_err(|e| {
        PipelineError::Checkpoint(format!("cannot load {}: {e}", source.display()))
    })?;
    ctx.workspace.write_file(dest, &content, GEN_CODE_BUCKET)?;
    tracing::info!(source = %source.display(), dest = %dest.display(), "artifact loaded");

    let artifact = Artifact::loaded(dest, content);
    emit(
        sink,
        TelemetryEvent::ArtifactProduced(CodePayload {
            language: artifact.language.clone(),
            code: artifact.content.clone(),
            file_path: artifact.relative_path.display().to_string(),
        }),
    )
    .await;
    ctx.artifact = Some(artifact);
    Ok(())
}
