//! External capability seams
//!
//! The orchestrator only ever talks to these traits. Concrete implementations
//! (command-backed adapters, scripted test doubles) are injected as
//! `Arc<dyn Trait>` at a single construction point.

use crate::context::PipelineContext;
use crate::error::CapabilityError;
use crate::types::{AgentResult, AnalysisResult, BuildOutcome, CheckReport, GeneratedCode};
use async_trait::async_trait;
use genloop_archive::Workspace;
use std::path::Path;

/// Produces a candidate artifact from a prompt
#[async_trait]
pub trait Generator: Send + Sync {
    /// Name reported in `agent_update` events
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        ctx: &PipelineContext,
    ) -> Result<GeneratedCode, CapabilityError>;
}

/// Static analysis of a produced artifact
#[async_trait]
pub trait StaticChecker: Send + Sync {
    /// Checker label in `check_result` events
    fn name(&self) -> &str {
        "ESLint"
    }

    async fn check(&self, artifact_path: &Path) -> Result<CheckReport, CapabilityError>;
}

/// Build verification
///
/// Infrastructure faults are folded into [`BuildOutcome::FatalAbort`].
#[async_trait]
pub trait Builder: Send + Sync {
    /// Checker label in `check_result` events
    fn name(&self) -> &str {
        "Build"
    }

    /// Command line reported as `rule_id` of build check results
    fn command(&self) -> &str {
        "npm run build"
    }

    async fn build(&self, ctx: &PipelineContext) -> BuildOutcome;
}

/// Root-cause analysis of a build diagnostic
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str {
        "BuildErrorAnalyzer"
    }

    /// `Ok(None)` means the capability produced no structured result
    async fn analyze(
        &self,
        diagnostic: &str,
        ctx: &PipelineContext,
    ) -> Result<Option<AnalysisResult>, CapabilityError>;
}

/// Applies a fix policy to files in the workspace
///
/// Writes must go through [`Workspace::write_file`] so every overwritten file
/// is archived first.
#[async_trait]
pub trait Fixer: Send + Sync {
    fn name(&self) -> &str {
        "BuildErrorFixer"
    }

    async fn fix(
        &self,
        analysis: &AnalysisResult,
        workspace: &Workspace,
    ) -> Result<AgentResult, CapabilityError>;
}
