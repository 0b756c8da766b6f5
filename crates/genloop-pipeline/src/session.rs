//! Run-tests session
//!
//! started, runner, report reduction, `test_result`, one `test_screenshot`
//! per image, then exactly one `done`.

use crate::error::PipelineError;
use crate::repair::panic_message;
use crate::telemetry::TelemetrySink;
use futures::FutureExt;
use genloop_core::{
    messages, BuildOutcome, DonePayload, PipelineContext, RunnerConfig, ScreenshotPayload,
    TelemetryEvent, TestResultPayload,
};
use genloop_report::{ReportReducer, StabilityPolicy};
use genloop_runner::{RunRequest, TestRunner};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::SystemTime;

/// Name reported in the session's `agent_update` event
pub const TEST_RUNNER_AGENT: &str = "TestRunner";

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Runs one test file and reports its reduced result
#[derive(Debug, Clone)]
pub struct TestSession {
    runner: TestRunner,
    reducer: ReportReducer,
}

impl TestSession {
    pub fn new(runner: TestRunner, reducer: ReportReducer) -> Self {
        Self { runner, reducer }
    }

    /// Runner and reducer from the `[runner]` section
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            TestRunner::new(config.clone()),
            ReportReducer::new(StabilityPolicy::from_millis(
                config.stability_timeout_ms,
                config.stability_interval_ms,
            )),
        )
    }

    pub async fn run(
        &self,
        request: &RunRequest,
        ctx: &mut PipelineContext,
        sink: &dyn TelemetrySink,
    ) -> DonePayload {
        let attempt = AssertUnwindSafe(self.drive(request, ctx, sink))
            .catch_unwind()
            .await;

        let outcome = match attempt {
            Ok(Ok(done)) => done,
            Ok(Err(PipelineError::SinkClosed)) => DonePayload::failed(messages::CANCELLED),
            Ok(Err(err)) => unexpected(sink, err.to_string()).await,
            Err(panic) => unexpected(sink, panic_message(panic.as_ref())).await,
        };

        tracing::info!(status = ?outcome.status, message = %outcome.message, "test session finished");
        if let Err(err) = sink.emit(TelemetryEvent::Done(outcome.clone())).await {
            tracing::debug!(error = %err, "done event dropped");
        }
        outcome
    }

    async fn drive(
        &self,
        request: &RunRequest,
        ctx: &mut PipelineContext,
        sink: &dyn TelemetrySink,
    ) -> Result<DonePayload, PipelineError> {
        sink.emit(TelemetryEvent::started(ctx.step_id.as_str())).await?;
        if sink.is_closed() {
            return Ok(DonePayload::failed(messages::CANCELLED));
        }
        sink.emit(TelemetryEvent::agent_update(TEST_RUNNER_AGENT)).await?;

        let run = match self.runner.run(request, ctx).await {
            Ok(run) => run,
            Err(err) => {
                tracing::error!(error = %err, "test runner failed to start");
                sink.emit(TelemetryEvent::system_error("Runner Error", err.to_string()))
                    .await?;
                return Ok(DonePayload::failed(messages::TESTS_FAILED));
            }
        };
        tracing::info!(invocations = run.invocations, archived = run.archived, "test run finished");

        if let BuildOutcome::FatalAbort(detail) = &run.outcome {
            sink.emit(TelemetryEvent::system_error("Test Aborted", detail.clone()))
                .await?;
            sink.emit(TelemetryEvent::TestResult(TestResultPayload::from_failure(detail.clone())))
                .await?;
            return Ok(DonePayload::failed(messages::TESTS_FAILED));
        }

        let reduction = match self
            .reducer
            .reduce_and_persist(&ctx.report_path(), ctx.report_mtime, &ctx.workspace)
            .await
        {
            Ok(reduction) => reduction,
            Err(err) => {
                tracing::error!(error = %err, "report reduction failed");
                sink.emit(TelemetryEvent::system_error("Report Error", err.to_string()))
                    .await?;
                sink.emit(TelemetryEvent::TestResult(TestResultPayload::from_failure(
                    err.to_string(),
                )))
                .await?;
                return Ok(DonePayload::failed(messages::TESTS_FAILED));
            }
        };

        sink.emit(TelemetryEvent::TestResult(TestResultPayload::from_suite(
            &reduction.suite,
        )))
        .await?;

        for shot in screenshots(ctx).await? {
            sink.emit(TelemetryEvent::ScreenshotProduced(shot)).await?;
        }

        Ok(if reduction.suite.passed && run.outcome.is_success() {
            DonePayload::completed(messages::TESTS_PASSED)
        } else {
            DonePayload::failed(messages::TESTS_FAILED)
        })
    }
}

async fn unexpected(sink: &dyn TelemetrySink, detail: String) -> DonePayload {
    tracing::error!(%detail, "unexpected error");
    if let Err(err) = sink
        .emit(TelemetryEvent::system_error(messages::UNEXPECTED_ERROR_LABEL, detail))
        .await
    {
        tracing::debug!(error = %err, "system_error dropped");
    }
    DonePayload::failed(messages::UNEXPECTED_ERROR)
}

/// Images in the screenshot directory, sorted by file name
pub async fn screenshots(ctx: &PipelineContext) -> Result<Vec<ScreenshotPayload>, PipelineError> {
    let dir = ctx.screenshot_path();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(genloop_core::CoreError::io(&dir, err).into()),
    };

    let mut shots = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| genloop_core::CoreError::io(&dir, e))?
    {
        let path = entry.path();
        if !is_image(&path) {
            continue;
        }
        let modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
        shots.push(ScreenshotPayload {
            spec: ctx.test_file.clone(),
            filename: entry.file_name().to_string_lossy().into_owned(),
            url: relative_url(ctx.output_root(), &path),
            updated: is_updated(modified, ctx.report_mtime),
        });
    }
    shots.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(shots)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn is_updated(modified: Option<SystemTime>, prior: Option<SystemTime>) -> bool {
    match (modified, prior) {
        (_, None) => true,
        (Some(m), Some(p)) => m > p,
        (None, Some(_)) => false,
    }
}

fn relative_url(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
