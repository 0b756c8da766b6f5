//! Interactive development checkpoints
//!
//! The orchestrator may suspend at three points per iteration and wait for
//! an operator command. Checkpoints are off unless a [`CheckpointControl`]
//! is installed, and they never change the non-interactive control flow.

use crate::error::PipelineError;
use async_trait::async_trait;
use genloop_core::PipelineContext;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

/// Suspension point within one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// CP1
    BeforeGenerate,
    /// CP2
    BeforeCheck,
    /// CP3
    BeforeBuild,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeforeGenerate => "CP1",
            Self::BeforeCheck => "CP2",
            Self::BeforeBuild => "CP3",
        })
    }
}

/// Operator decision at a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointCommand {
    Continue,
    /// Controlled stop, reported as a completed session
    End,
    /// Skip the next capability invocation
    Skip,
    /// Copy `source` to `dest` in the output workspace and use it as the artifact
    Load { source: PathBuf, dest: PathBuf },
}

/// Command letter to command; `l` needs its paths filled in separately.
///
/// Unknown input ends the session.
#[must_use]
pub fn parse_command(input: &str) -> CheckpointCommand {
    match input.trim().to_ascii_lowercase().as_str() {
        "c" => CheckpointCommand::Continue,
        "s" => CheckpointCommand::Skip,
        "l" => CheckpointCommand::Load {
            source: PathBuf::new(),
            dest: PathBuf::new(),
        },
        _ => CheckpointCommand::End,
    }
}

/// Source of checkpoint commands
#[async_trait]
pub trait CheckpointControl: Send + Sync {
    async fn await_command(
        &self,
        at: Checkpoint,
        ctx: &PipelineContext,
    ) -> Result<CheckpointCommand, PipelineError>;
}

/// Reads commands line by line from a reader, prompting on stderr
pub struct ConsoleCheckpoint<R> {
    input: tokio::sync::Mutex<R>,
}

impl ConsoleCheckpoint<BufReader<Stdin>> {
    /// Console over process stdin
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleCheckpoint<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self {
            input: tokio::sync::Mutex::new(input),
        }
    }

    async fn ask(input: &mut R, question: &str) -> Result<String, PipelineError> {
        let mut stderr = tokio::io::stderr();
        let prompt_failed = |e: std::io::Error| PipelineError::Checkpoint(e.to_string());
        stderr.write_all(question.as_bytes()).await.map_err(prompt_failed)?;
        stderr.flush().await.map_err(prompt_failed)?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .await
            .map_err(|e| PipelineError::Checkpoint(e.to_string()))?;
        if read == 0 {
            return Err(PipelineError::Checkpoint("input closed".to_owned()));
        }
        Ok(line.trim().to_owned())
    }
}

#[async_trait]
impl<R> CheckpointControl for ConsoleCheckpoint<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn await_command(
        &self,
        at: Checkpoint,
        ctx: &PipelineContext,
    ) -> Result<CheckpointCommand, PipelineError> {
        tracing::info!(checkpoint = %at, step_id = %ctx.step_id, "waiting for operator");
        let mut input = self.input.lock().await;

        let answer = Self::ask(
            &mut *input,
            &format!("[{at}] (c)ontinue, (e)nd, (s)kip, (l)oad code: "),
        )
        .await?;
        let command = match parse_command(&answer) {
            CheckpointCommand::Load { .. } => {
                let source = Self::ask(&mut *input, "Enter source filename to load: ").await?;
                let dest = Self::ask(&mut *input, "Enter destination filename to save: ").await?;
                CheckpointCommand::Load {
                    source: source.into(),
                    dest: dest.into(),
                }
            }
            other => other,
        };

        tracing::debug!(checkpoint = %at, ?command, "operator command");
        Ok(command)
    }
}

/// Replays a fixed command list, then continues
#[derive(Debug, Default)]
pub struct ScriptedCheckpoint {
    commands: Mutex<VecDeque<CheckpointCommand>>,
    seen: Mutex<Vec<Checkpoint>>,
}

impl ScriptedCheckpoint {
    pub fn new(commands: impl IntoIterator<Item = CheckpointCommand>) -> Self {
        Self {
            commands: Mutex::new(commands.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Checkpoints reached so far, in order
    pub fn seen(&self) -> Vec<Checkpoint> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl CheckpointControl for ScriptedCheckpoint {
    async fn await_command(
        &self,
        at: Checkpoint,
        _ctx: &PipelineContext,
    ) -> Result<CheckpointCommand, PipelineError> {
        self.seen.lock().push(at);
        Ok(self
            .commands
            .lock()
            .pop_front()
            .unwrap_or(CheckpointCommand::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use genloop_core::StepId;
    use pretty_assertions::assert_eq;

    fn ctx() -> PipelineContext {
        PipelineContext::new("GenCode", "/tmp/out", "/tmp/arch", StepId::generate(Local::now()))
    }

    #[test]
    fn letters_map_to_commands() {
        assert_eq!(parse_command("c"), CheckpointCommand::Continue);
        assert_eq!(parse_command(" S \n"), CheckpointCommand::Skip);
        assert_eq!(parse_command("e"), CheckpointCommand::End);
        assert_eq!(parse_command("what"), CheckpointCommand::End);
        assert!(matches!(parse_command("l"), CheckpointCommand::Load { .. }));
    }

    #[tokio::test]
    async fn console_reads_load_paths() {
        let input: &[u8] = b"l\n/tmp/page.tsx\napp/page.tsx\n";
        let console = ConsoleCheckpoint::new(input);
        let cmd = console
            .await_command(Checkpoint::BeforeBuild, &ctx())
            .await
            .unwrap();
        assert_eq!(
            cmd,
            CheckpointCommand::Load {
                source: "/tmp/page.tsx".into(),
                dest: "app/page.tsx".into()
            }
        );
    }

    #[tokio::test]
    async fn console_reports_closed_input() {
        let input: &[u8] = b"";
        let console = ConsoleCheckpoint::new(input);
        let err = console
            .await_command(Checkpoint::BeforeGenerate, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn scripted_falls_back_to_continue() {
        let script = ScriptedCheckpoint::new([CheckpointCommand::Skip]);
        let c = ctx();
        assert_eq!(
            script.await_command(Checkpoint::BeforeGenerate, &c).await.unwrap(),
            CheckpointCommand::Skip
        );
        assert_eq!(
            script.await_command(Checkpoint::BeforeCheck, &c).await.unwrap(),
            CheckpointCommand::Continue
        );
        assert_eq!(script.seen(), vec![Checkpoint::BeforeGenerate, Checkpoint::BeforeCheck]);
    }
}
