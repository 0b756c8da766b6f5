//! Testing utilities for genloop workspace
//!
//! Scripted capability doubles with call counters, and session fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Local;
use genloop_core::{
    AgentResult, AnalysisResult, Analyzer, BuildOutcome, Builder, CapabilityError, CheckIssue,
    CheckReport, Confidence, Fixer, GeneratedCode, Generator, PipelineContext, StaticChecker,
    StepId, Workspace,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Replies in order, then repeats the fallback
#[derive(Debug)]
pub struct Script<T> {
    queue: Mutex<VecDeque<T>>,
    fallback: T,
    calls: AtomicU32,
}

impl<T: Clone> Script<T> {
    pub fn new(replies: impl IntoIterator<Item = T>, fallback: T) -> Self {
        Self {
            queue: Mutex::new(replies.into_iter().collect()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn page(content: &str) -> GeneratedCode {
    GeneratedCode::new("app/page.tsx", content, "tsx")
}

pub fn issue(rule_id: &str, message: &str, description: &str) -> CheckIssue {
    CheckIssue {
        rule_id: rule_id.to_string(),
        message: message.to_string(),
        description: description.to_string(),
    }
}

pub fn sample_analysis() -> AnalysisResult {
    AnalysisResult {
        summary: "Client hook used in a server component".to_string(),
        root_cause: "useState without 'use client'".to_string(),
        files_to_fix: vec!["app/page.tsx".to_string()],
        fix_policy: vec!["add 'use client' as the first line".to_string()],
        confidence: Confidence::Probable,
    }
}

/// Generator replaying a script; records every prompt it sees
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Script<Result<GeneratedCode, CapabilityError>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(
        replies: impl IntoIterator<Item = Result<GeneratedCode, CapabilityError>>,
    ) -> Self {
        Self {
            script: Script::new(replies, Ok(page("export default function Page() {}"))),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(code: GeneratedCode) -> Self {
        Self {
            script: Script::new([], Ok(code)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "ScriptedGenerator"
    }

    async fn generate(
        &self,
        prompt: &str,
        _ctx: &PipelineContext,
    ) -> Result<GeneratedCode, CapabilityError> {
        self.prompts.lock().push(prompt.to_string());
        self.script.next()
    }
}

/// Static checker replaying a script, clean afterwards
#[derive(Debug)]
pub struct ScriptedChecker {
    script: Script<Result<CheckReport, CapabilityError>>,
}

impl ScriptedChecker {
    pub fn new(replies: impl IntoIterator<Item = Result<CheckReport, CapabilityError>>) -> Self {
        Self {
            script: Script::new(replies, Ok(CheckReport::Clean)),
        }
    }

    pub fn clean() -> Self {
        Self::new([])
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl StaticChecker for ScriptedChecker {
    async fn check(&self, _artifact_path: &Path) -> Result<CheckReport, CapabilityError> {
        self.script.next()
    }
}

/// Builder replaying a script, succeeding afterwards
#[derive(Debug)]
pub struct ScriptedBuilder {
    script: Script<BuildOutcome>,
}

impl ScriptedBuilder {
    pub fn new(replies: impl IntoIterator<Item = BuildOutcome>) -> Self {
        Self {
            script: Script::new(replies, BuildOutcome::Success),
        }
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl Builder for ScriptedBuilder {
    async fn build(&self, _ctx: &PipelineContext) -> BuildOutcome {
        self.script.next()
    }
}

/// Analyzer returning one fixed reply
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    script: Script<Result<Option<AnalysisResult>, CapabilityError>>,
}

impl ScriptedAnalyzer {
    pub fn new(reply: Result<Option<AnalysisResult>, CapabilityError>) -> Self {
        Self {
            script: Script::new([], reply),
        }
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _diagnostic: &str,
        _ctx: &PipelineContext,
    ) -> Result<Option<AnalysisResult>, CapabilityError> {
        self.script.next()
    }
}

/// Fixer that writes fixed files through the workspace
#[derive(Debug)]
pub struct ScriptedFixer {
    files: Vec<(PathBuf, String)>,
    result: AgentResult,
    calls: AtomicU32,
}

impl ScriptedFixer {
    pub fn new(files: impl IntoIterator<Item = (PathBuf, String)>, result: AgentResult) -> Self {
        Self {
            files: files.into_iter().collect(),
            result,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fixer for ScriptedFixer {
    async fn fix(
        &self,
        _analysis: &AnalysisResult,
        workspace: &Workspace,
    ) -> Result<AgentResult, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (path, content) in &self.files {
            workspace.write_file(path, content, "fix_code")?;
        }
        Ok(self.result.clone())
    }
}

/// Temporary output root and session directory with a context over them
pub struct Fixture {
    pub dir: TempDir,
    pub ctx: PipelineContext,
}

impl Fixture {
    pub fn new(retry_limit: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("output");
        let step_id = StepId::generate(Local::now());
        let step_dir = dir.path().join("archive").join(step_id.as_str());
        std::fs::create_dir_all(&output).unwrap();
        std::fs::create_dir_all(&step_dir).unwrap();
        let ctx = PipelineContext::new("GenCode", output, step_dir, step_id)
            .with_retry_limit(retry_limit);
        Self { dir, ctx }
    }

    #[must_use]
    pub fn with_build_check(mut self) -> Self {
        self.ctx.build_check = true;
        self
    }

    pub fn output(&self) -> &Path {
        self.ctx.output_root()
    }

    /// Write a file under the output root
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.output().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Number of files under the session directory, recursively
    pub fn archived_files(&self) -> usize {
        count_files(self.ctx.step_dir())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() {
                        count_files(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}
