//! Test Execution Runner
//!
//! Launches the external test runner, watches stdout and stderr line by
//! line, and applies at most one baseline-refresh rerun. Raw report and info
//! files are archived into the session's `playwright` bucket after every run
//! that was not aborted by a 404.

use crate::error::RunnerError;
use crate::signature::{classify_line, LineSignal};
use genloop_core::{BuildOutcome, PipelineContext, RunnerConfig};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};

/// Archive bucket for raw runner files
pub const RUNNER_BUCKET: &str = "playwright";

/// Maximum number of runner invocations per request
pub const MAX_INVOCATIONS: u32 = 2;

/// One run-tests request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Test directory relative to the output root
    pub test_dir: String,
    pub test_file: String,
    pub project: Option<String>,
}

impl RunRequest {
    pub fn new(test_dir: impl Into<String>, test_file: impl Into<String>) -> Self {
        Self {
            test_dir: test_dir.into(),
            test_file: test_file.into(),
            project: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }
}

/// Result of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunOutcome {
    pub outcome: BuildOutcome,
    /// How many times the runner process was started
    pub invocations: u32,
    /// Whether report/info files were archived
    pub archived: bool,
}

/// How one invocation ended
#[derive(Debug)]
enum Attempt {
    Aborted(LineSignal),
    TimedOut,
    Exited {
        status: ExitStatus,
        snapshot_missing: bool,
    },
}

/// Drives the external test-runner process
#[derive(Debug, Clone)]
pub struct TestRunner {
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run one request to completion.
    ///
    /// Records the pre-run report mtime in `ctx.report_mtime` before each
    /// invocation, so report reduction can wait for a newer file.
    pub async fn run(
        &self,
        request: &RunRequest,
        ctx: &mut PipelineContext,
    ) -> Result<TestRunOutcome, RunnerError> {
        ctx.test_file = request.test_file.clone();
        let test_path = ctx
            .output_root()
            .join(&request.test_dir)
            .join(&request.test_file);

        if !test_path.is_file() {
            tracing::error!(path = %test_path.display(), "test file not found");
            return Ok(TestRunOutcome {
                outcome: BuildOutcome::FatalAbort(format!("{} not found", test_path.display())),
                invocations: 0,
                archived: false,
            });
        }

        let report_path = ctx.report_path();
        let mut update_snapshots = false;
        let mut invocations = 0;

        loop {
            ctx.report_mtime = modified_time(&report_path);
            invocations += 1;
            tracing::info!(
                test = %test_path.display(),
                invocation = invocations,
                update_snapshots,
                "starting test runner"
            );

            let attempt = self
                .invoke(&test_path, ctx.output_root(), request, update_snapshots)
                .await?;

            let outcome = match attempt {
                Attempt::Aborted(LineSignal::NotFound) => {
                    tracing::error!("404 detected, aborting without archive");
                    return Ok(TestRunOutcome {
                        outcome: BuildOutcome::FatalAbort(LineSignal::NotFound.detail().into()),
                        invocations,
                        archived: false,
                    });
                }
                Attempt::Aborted(signal) => {
                    tracing::error!(detail = signal.detail(), "test run aborted");
                    BuildOutcome::FatalAbort(signal.detail().into())
                }
                Attempt::TimedOut => {
                    let detail = format!("test runner timed out after {}s", self.config.timeout_secs);
                    tracing::error!(%detail);
                    BuildOutcome::FatalAbort(detail)
                }
                Attempt::Exited {
                    status,
                    snapshot_missing,
                } => {
                    if !status.success()
                        && snapshot_missing
                        && !update_snapshots
                        && invocations < MAX_INVOCATIONS
                    {
                        tracing::warn!("baseline snapshot missing, rerunning once with refresh");
                        update_snapshots = true;
                        continue;
                    }
                    if status.success() {
                        BuildOutcome::Success
                    } else {
                        BuildOutcome::RetryableFailure(format!(
                            "test runner exited with {}",
                            describe(status)
                        ))
                    }
                }
            };

            let archived = self.archive_results(ctx)?;
            return Ok(TestRunOutcome {
                outcome,
                invocations,
                archived,
            });
        }
    }

    fn command(&self, test_path: &Path, cwd: &Path, request: &RunRequest, update: bool) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        if update {
            cmd.arg(&self.config.update_snapshots_flag);
        }
        if let Some(project) = request.project.as_ref().or(self.config.project.as_ref()) {
            cmd.arg(format!("--project={project}"));
        }
        cmd.arg(test_path)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn invoke(
        &self,
        test_path: &Path,
        cwd: &Path,
        request: &RunRequest,
        update: bool,
    ) -> Result<Attempt, RunnerError> {
        let mut child = self
            .command(test_path, cwd, request, update)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let limit = Duration::from_secs(self.config.timeout_secs.max(1));
        match tokio::time::timeout(limit, watch(&mut child)).await {
            Ok(result) => result,
            Err(_) => {
                kill(&mut child);
                Ok(Attempt::TimedOut)
            }
        }
    }

    fn archive_results(&self, ctx: &PipelineContext) -> Result<bool, RunnerError> {
        let mut archived = false;
        for path in [ctx.info_path(), ctx.report_path()] {
            if !path.is_file() {
                tracing::warn!(path = %path.display(), "runner output missing, not archived");
                continue;
            }
            ctx.workspace.archive_into(&path, RUNNER_BUCKET)?;
            archived = true;
        }
        Ok(archived)
    }
}

/// Output stream a line came from
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Read stdout and stderr together until an abort signature or EOF on both,
/// then wait for exit
async fn watch(child: &mut Child) -> Result<Attempt, RunnerError> {
    let mut stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
    let mut stderr = child.stderr.take().map(|err| BufReader::new(err).lines());
    let mut snapshot_missing = false;

    while stdout.is_some() || stderr.is_some() {
        let (stream, read) = tokio::select! {
            read = next_line(&mut stdout) => (Stream::Stdout, read),
            read = next_line(&mut stderr) => (Stream::Stderr, read),
        };

        let line = match (stream, read) {
            (_, Ok(Some(line))) => line,
            (Stream::Stdout, Ok(None)) => {
                stdout = None;
                continue;
            }
            (Stream::Stderr, Ok(None)) => {
                stderr = None;
                continue;
            }
            (Stream::Stdout, Err(err)) => return Err(err.into()),
            (Stream::Stderr, Err(err)) => {
                tracing::warn!(error = %err, "test runner stderr unreadable, ignoring it");
                stderr = None;
                continue;
            }
        };

        tracing::debug!(target: "genloop_runner::output", ?stream, "{line}");
        match classify_line(&line) {
            Some(signal) if signal.is_abort() => {
                kill(child);
                return Ok(Attempt::Aborted(signal));
            }
            Some(LineSignal::SnapshotMissing) => snapshot_missing = true,
            _ => {}
        }
    }

    let status = child.wait().await?;
    Ok(Attempt::Exited {
        status,
        snapshot_missing,
    })
}

/// Next line of an open stream; a closed stream never resolves
async fn next_line<R>(lines: &mut Option<Lines<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

fn kill(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(error = %err, "failed to kill test runner");
    }
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("return code {code}"),
        None => "a signal".to_owned(),
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
