//! Bounded external command execution

use genloop_core::{CapabilityError, CommandSpec};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Failure to run a command to completion
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("i/o error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ProcessError> for CapabilityError {
    /// A command that cannot start is fatal; everything else may be retried
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { .. } => CapabilityError::Fatal(err.to_string()),
            ProcessError::TimedOut { .. } | ProcessError::Io { .. } => {
                CapabilityError::Transient(err.to_string())
            }
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// stdout followed by stderr
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Run `spec` plus `extra` arguments, optionally feeding `stdin`, and wait
/// at most `timeout`. The child is killed when the wait is abandoned.
pub async fn run_command<I, S>(
    spec: &CommandSpec,
    extra: I,
    cwd: Option<&Path>,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .args(extra)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(command = %spec.display(), "spawning");
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let io_error = |source| ProcessError::Io {
        program: spec.program.clone(),
        source,
    };

    // stdin is fed while output is drained, both under the one deadline
    let pipe = child.stdin.take();
    let feed = async move {
        match (stdin, pipe) {
            (Some(input), Some(mut pipe)) => {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await
            }
            _ => Ok::<(), std::io::Error>(()),
        }
    };

    let finished = tokio::time::timeout(timeout, async {
        tokio::join!(feed, child.wait_with_output())
    })
    .await;
    let (fed, output) = match finished {
        Ok(pair) => pair,
        Err(_) => {
            tracing::warn!(command = %spec.display(), secs = timeout.as_secs(), "command timed out");
            return Err(ProcessError::TimedOut {
                program: spec.program.clone(),
                secs: timeout.as_secs(),
            });
        }
    };
    let output = output.map_err(io_error)?;
    match fed {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::debug!(command = %spec.display(), "command exited without reading all input");
        }
        Err(err) => return Err(io_error(err)),
    }

    tracing::debug!(command = %spec.display(), code = ?output.status.code(), "command finished");
    Ok(ProcessOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const NO_ARGS: [&str; 0] = [];

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run_command(&sh("echo hi; exit 3"), NO_ARGS, None, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.code(), Some(3));
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = run_command(&sh("cat"), NO_ARGS, None, Some("prompt text"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "prompt text");
    }

    #[tokio::test]
    async fn times_out() {
        let err = run_command(&sh("sleep 5"), NO_ARGS, None, None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(CapabilityError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn unread_stdin_does_not_outlive_timeout() {
        let input = "x".repeat(1 << 20);
        let started = std::time::Instant::now();
        let err = run_command(
            &sh("sleep 5"),
            NO_ARGS,
            None,
            Some(&input),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn child_ignoring_stdin_still_reports_output() {
        let input = "x".repeat(1 << 20);
        let out = run_command(&sh("echo done"), NO_ARGS, None, Some(&input), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "done");
    }

    #[tokio::test]
    async fn missing_program_is_fatal() {
        let spec = CommandSpec::new("genloop-no-such-program", Vec::<String>::new());
        let err = run_command(&spec, NO_ARGS, None, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(!CapabilityError::from(err).is_retryable());
    }
}
