//! Per-session pipeline state
//!
//! A [`PipelineContext`] is created once per request, threaded through every
//! step by `&mut`, and dropped when the session ends. Nothing in it is shared
//! between sessions except the file system.

use crate::config::{GenloopConfig, ResultsLayout};
use crate::error::CoreError;
use crate::types::{Artifact, ErrorClassification};
use chrono::{DateTime, Local};
use genloop_archive::Workspace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Session identifier, also the name of the session archive directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    /// `StepID-YYYYMMDD-HHMMSS-<8 hex>`
    #[must_use]
    pub fn generate(at: DateTime<Local>) -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "StepID-{}-{}",
            at.format("%Y%m%d-%H%M%S"),
            &nonce[..8]
        ))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable single-session state
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub category: String,
    /// Output root and session archive
    pub workspace: Workspace,
    pub retry_limit: u32,
    pub build_check: bool,
    pub max_turns: u32,
    pub step_id: StepId,
    pub results: ResultsLayout,
    /// Guidance fragments from failed static checks, de-duplicated
    supplementary_prompts: Vec<String>,
    pub artifact: Option<Artifact>,
    pub classification: ErrorClassification,
    /// Test file of the current run-tests request, relative to the test dir
    pub test_file: String,
    /// Report mtime observed before the latest test run
    pub report_mtime: Option<SystemTime>,
}

impl PipelineContext {
    /// Context over an existing output root and session directory
    pub fn new(
        category: impl Into<String>,
        output_root: impl Into<PathBuf>,
        step_dir: impl Into<PathBuf>,
        step_id: StepId,
    ) -> Self {
        Self {
            category: category.into(),
            workspace: Workspace::new(output_root, step_dir),
            retry_limit: 3,
            build_check: false,
            max_turns: 10,
            step_id,
            results: ResultsLayout::default(),
            supplementary_prompts: Vec::new(),
            artifact: None,
            classification: ErrorClassification::None,
            test_file: String::new(),
            report_mtime: None,
        }
    }

    /// Resolve directories, load the results layout and create a fresh
    /// session archive directory
    pub fn create(
        category: impl Into<String>,
        build_check: bool,
        config: &GenloopConfig,
    ) -> Result<Self, CoreError> {
        let output_root = absolutize(&config.workspace.output_dir)?;
        if !output_root.is_dir() {
            return Err(CoreError::Config(format!(
                "output directory not found: {}",
                output_root.display()
            )));
        }

        let layout_file = output_root.join(&config.workspace.results_layout_file);
        let results = ResultsLayout::load_or(&layout_file, &config.results)?;

        let archive_dir = absolutize(&config.workspace.archive_dir)?;
        fs::create_dir_all(&archive_dir).map_err(|e| CoreError::io(&archive_dir, e))?;

        let step_id = StepId::generate(Local::now());
        let step_dir = archive_dir.join(step_id.as_str());
        // create_dir, not create_dir_all: a session directory is never reused
        fs::create_dir(&step_dir).map_err(|e| CoreError::io(&step_dir, e))?;

        tracing::info!(
            step_id = %step_id,
            output = %output_root.display(),
            "session context created"
        );

        Ok(Self::new(category, output_root, step_dir, step_id)
            .with_retry_limit(config.pipeline.retry_limit)
            .with_build_check(build_check)
            .with_max_turns(config.pipeline.max_turns)
            .with_results(results))
    }

    #[inline]
    #[must_use]
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_build_check(mut self, enabled: bool) -> Self {
        self.build_check = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_results(mut self, results: ResultsLayout) -> Self {
        self.results = results;
        self
    }

    #[inline]
    #[must_use]
    pub fn output_root(&self) -> &Path {
        self.workspace.root()
    }

    /// Session archive directory
    #[inline]
    #[must_use]
    pub fn step_dir(&self) -> &Path {
        self.workspace.archive_root()
    }

    /// Append a fragment unless it is blank or already present.
    ///
    /// Returns whether the list grew.
    pub fn add_supplementary(&mut self, fragment: &str) -> bool {
        let fragment = fragment.trim();
        if fragment.is_empty() || self.supplementary_prompts.iter().any(|p| p == fragment) {
            return false;
        }
        self.supplementary_prompts.push(fragment.to_owned());
        true
    }

    #[must_use]
    pub fn supplementary_prompts(&self) -> &[String] {
        &self.supplementary_prompts
    }

    /// Absolute path of the current artifact
    #[must_use]
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.artifact
            .as_ref()
            .map(|a| self.output_root().join(&a.relative_path))
    }

    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.results.report_path(self.output_root())
    }

    #[must_use]
    pub fn info_path(&self) -> PathBuf {
        self.results.info_path(self.output_root())
    }

    #[must_use]
    pub fn screenshot_path(&self) -> PathBuf {
        self.results.screenshot_path(self.output_root())
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, CoreError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| CoreError::io(".", e))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> PipelineContext {
        PipelineContext::new(
            "GenCode",
            dir.path().join("output"),
            dir.path().join("archive/step"),
            StepId::generate(Local::now()),
        )
    }

    #[test]
    fn step_id_format() {
        let id = StepId::generate(Local::now());
        let parts: Vec<_> = id.as_str().split('-').collect();
        assert_eq!(parts[0], "StepID");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn supplementary_fragments_are_trimmed_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);

        assert!(ctx.add_supplementary("  use client directive missing "));
        assert!(!ctx.add_supplementary("use client directive missing"));
        assert!(!ctx.add_supplementary("   "));
        assert!(ctx.add_supplementary("no img element"));

        assert_eq!(
            ctx.supplementary_prompts(),
            ["use client directive missing", "no img element"]
        );
    }

    #[test]
    fn create_makes_a_unique_session_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("output")).unwrap();
        let mut config = GenloopConfig::default();
        config.workspace.output_dir = dir.path().join("output");
        config.workspace.archive_dir = dir.path().join("archive");

        let a = PipelineContext::create("GenCode", true, &config).unwrap();
        let b = PipelineContext::create("GenCode", true, &config).unwrap();

        assert!(a.step_dir().is_dir());
        assert_ne!(a.step_dir(), b.step_dir());
        assert!(a.build_check);
        assert_eq!(a.results, ResultsLayout::default());
    }

    #[test]
    fn create_reads_results_layout_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("output");
        fs::create_dir_all(&out).unwrap();
        fs::write(
            out.join("genloop.results.json"),
            r#"{"results_dir": "pw", "report_file": "r.json"}"#,
        )
        .unwrap();
        let mut config = GenloopConfig::default();
        config.workspace.output_dir = out.clone();
        config.workspace.archive_dir = dir.path().join("archive");

        let ctx = PipelineContext::create("RunTests", false, &config).unwrap();
        assert_eq!(ctx.report_path(), out.join("pw/r.json"));
    }

    #[test]
    fn create_requires_output_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = GenloopConfig::default();
        config.workspace.output_dir = dir.path().join("missing");
        assert!(PipelineContext::create("GenCode", false, &config).is_err());
    }
}
