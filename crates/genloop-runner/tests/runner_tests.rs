//! Runner behaviour against scripted test-runner processes
#![cfg(unix)]

use chrono::Local;
use genloop_core::{BuildOutcome, PipelineContext, RunnerConfig, StepId};
use genloop_runner::{RunRequest, TestRunner};
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("output/tests")).unwrap();
        fs::create_dir_all(dir.path().join("output/results")).unwrap();
        fs::create_dir_all(dir.path().join("archive/step")).unwrap();
        fs::write(dir.path().join("output/tests/home.spec.ts"), "test()").unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    fn context(&self) -> PipelineContext {
        PipelineContext::new(
            "RunTests",
            self.path("output"),
            self.path("archive/step"),
            StepId::generate(Local::now()),
        )
    }

    /// Runner whose program is `sh -c <script>`; runner flags arrive as `$@`
    fn runner(&self, script: &str) -> TestRunner {
        self.runner_with_timeout(script, 30)
    }

    fn runner_with_timeout(&self, script: &str, timeout_secs: u64) -> TestRunner {
        TestRunner::new(RunnerConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "runner".into()],
            timeout_secs,
            ..RunnerConfig::default()
        })
    }

    fn invocation_count(&self) -> usize {
        fs::read_to_string(self.path("count"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn count_line(fx: &Fixture) -> String {
    format!("echo run >> '{}'", fx.path("count").display())
}

fn request() -> RunRequest {
    RunRequest::new("tests", "home.spec.ts")
}

/// Passing run archives report and info files
#[tokio::test]
async fn passing_run_archives_results() {
    let fx = Fixture::new();
    let script = format!(
        "{}; echo '{{}}' > results/playwright_report.json; echo '{{}}' > results/playwright_info.json; echo '  1 passed'; exit 0",
        count_line(&fx)
    );
    let mut ctx = fx.context();

    let run = fx.runner(&script).run(&request(), &mut ctx).await.unwrap();

    assert_eq!(run.outcome, BuildOutcome::Success);
    assert_eq!(run.invocations, 1);
    assert!(run.archived);
    assert!(fx.path("archive/step/playwright/playwright_report.json").is_file());
    assert!(fx.path("archive/step/playwright/playwright_info.json").is_file());
    assert_eq!(ctx.test_file, "home.spec.ts");
}

/// Non-zero exit is a retryable failure carrying the exit code
#[tokio::test]
async fn failing_run_is_retryable() {
    let fx = Fixture::new();
    let script = "echo '{}' > results/playwright_report.json; exit 1";
    let mut ctx = fx.context();

    let run = fx.runner(script).run(&request(), &mut ctx).await.unwrap();

    match run.outcome {
        BuildOutcome::RetryableFailure(detail) => assert!(detail.contains("return code 1")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(run.archived);
}

/// Missing baseline triggers exactly one rerun, with the refresh flag
#[tokio::test]
async fn missing_snapshot_reruns_once() {
    let fx = Fixture::new();
    let script = format!(
        "{}; case \"$*\" in *--update-snapshots*) echo \"Error: A snapshot doesn't exist at /x.png\"; exit 1;; *) echo \"Error: A snapshot doesn't exist at /x.png, writing actual.\"; exit 1;; esac",
        count_line(&fx)
    );
    let mut ctx = fx.context();

    let run = fx.runner(&script).run(&request(), &mut ctx).await.unwrap();

    assert_eq!(run.invocations, 2);
    assert_eq!(fx.invocation_count(), 2);
    assert!(matches!(run.outcome, BuildOutcome::RetryableFailure(_)));
}

/// A successful refresh rerun ends the request
#[tokio::test]
async fn snapshot_refresh_can_pass() {
    let fx = Fixture::new();
    let script = format!(
        "{}; case \"$*\" in *--update-snapshots*) exit 0;; *) echo \"Error: A snapshot doesn't exist at /x.png\"; exit 1;; esac",
        count_line(&fx)
    );
    let mut ctx = fx.context();

    let run = fx.runner(&script).run(&request(), &mut ctx).await.unwrap();

    assert_eq!(run.outcome, BuildOutcome::Success);
    assert_eq!(fx.invocation_count(), 2);
}

/// A 404 line aborts at once, without waiting for exit or archiving
#[tokio::test]
async fn status_404_aborts_immediately() {
    let fx = Fixture::new();
    let script = "echo '{}' > results/playwright_report.json; echo '{\"status\":404}'; sleep 20; exit 0";
    let mut ctx = fx.context();

    let started = Instant::now();
    let run = fx.runner(script).run(&request(), &mut ctx).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(run.outcome.is_fatal());
    assert!(!run.archived);
    assert!(!fx.path("archive/step/playwright").exists());
}

/// Port-in-use aborts at once as a fatal outcome
#[tokio::test]
async fn port_in_use_aborts() {
    let fx = Fixture::new();
    let script = "echo 'Error: http://localhost:3000 is already used'; sleep 20";
    let mut ctx = fx.context();

    let started = Instant::now();
    let run = fx.runner(script).run(&request(), &mut ctx).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        run.outcome,
        BuildOutcome::FatalAbort("Test server port already in use".into())
    );
}

/// Abort signatures on stderr count the same as on stdout
#[tokio::test]
async fn port_in_use_on_stderr_aborts() {
    let fx = Fixture::new();
    let script = "echo 'Error: http://localhost:3000 is already used' >&2; sleep 20; exit 1";
    let mut ctx = fx.context();

    let started = Instant::now();
    let run = fx.runner(script).run(&request(), &mut ctx).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        run.outcome,
        BuildOutcome::FatalAbort("Test server port already in use".into())
    );
}

#[tokio::test]
async fn status_404_on_stderr_skips_archive() {
    let fx = Fixture::new();
    let script = "echo '{}' > results/playwright_report.json; echo 'GET / {\"status\":404}' >&2; sleep 20";
    let mut ctx = fx.context();

    let run = fx.runner(script).run(&request(), &mut ctx).await.unwrap();

    assert!(run.outcome.is_fatal());
    assert!(!run.archived);
    assert!(!fx.path("archive/step/playwright").exists());
}

/// Snapshot signature on stderr still earns the single refresh rerun
#[tokio::test]
async fn missing_snapshot_on_stderr_reruns_once() {
    let fx = Fixture::new();
    let script = format!(
        "{}; case \"$*\" in *--update-snapshots*) exit 0;; *) echo \"Error: A snapshot doesn't exist at /x.png\" >&2; exit 1;; esac",
        count_line(&fx)
    );
    let mut ctx = fx.context();

    let run = fx.runner(&script).run(&request(), &mut ctx).await.unwrap();

    assert_eq!(run.outcome, BuildOutcome::Success);
    assert_eq!(run.invocations, 2);
}

/// A hung runner is killed at the timeout; its files are still archived
#[tokio::test]
async fn timed_out_run_is_fatal_and_archived() {
    let fx = Fixture::new();
    let script = "echo '{}' > results/playwright_report.json; echo '{}' > results/playwright_info.json; sleep 20";
    let mut ctx = fx.context();

    let started = Instant::now();
    let run = fx
        .runner_with_timeout(script, 1)
        .run(&request(), &mut ctx)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    match run.outcome {
        BuildOutcome::FatalAbort(detail) => assert!(detail.contains("timed out")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(run.invocations, 1);
    assert!(run.archived);
    assert!(fx.path("archive/step/playwright/playwright_report.json").is_file());
}

/// Missing test file is fatal and never starts the runner
#[tokio::test]
async fn missing_test_file_is_fatal() {
    let fx = Fixture::new();
    let mut ctx = fx.context();
    let script = count_line(&fx);

    let run = fx
        .runner(&script)
        .run(&RunRequest::new("tests", "absent.spec.ts"), &mut ctx)
        .await
        .unwrap();

    assert!(run.outcome.is_fatal());
    assert_eq!(run.invocations, 0);
    assert_eq!(fx.invocation_count(), 0);
}

/// Pre-run report mtime is recorded for reduction
#[tokio::test]
async fn records_prior_report_mtime() {
    let fx = Fixture::new();
    let report = fx.path("output/results/playwright_report.json");
    fs::write(&report, "{}").unwrap();
    let before = fs::metadata(&report).unwrap().modified().unwrap();
    let mut ctx = fx.context();

    fx.runner("exit 0").run(&request(), &mut ctx).await.unwrap();

    assert_eq!(ctx.report_mtime, Some(before));
}

/// Unknown program surfaces as a typed spawn error
#[tokio::test]
async fn spawn_failure_is_typed() {
    let fx = Fixture::new();
    let runner = TestRunner::new(RunnerConfig {
        program: "/nonexistent/genloop-test-runner".into(),
        args: vec![],
        ..RunnerConfig::default()
    });
    let mut ctx = fx.context();

    let err = runner.run(&request(), &mut ctx).await.unwrap_err();
    assert!(matches!(err, genloop_runner::RunnerError::Spawn { .. }));
}
