//! Single construction point for capabilities

use genloop_core::{BuildFailureStrategy, GenloopConfig};
use genloop_pipeline::adapters::{
    CommandAnalyzer, CommandBuilder, CommandFixer, CommandGenerator, EslintChecker,
};
use genloop_pipeline::{ConsoleCheckpoint, Orchestrator, RepairPipeline};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator over the command-backed capabilities in `[commands]`
pub fn orchestrator(
    config: &GenloopConfig,
    output_root: &Path,
    strategy: BuildFailureStrategy,
    checkpoints: bool,
) -> Orchestrator {
    let commands = &config.commands;
    let timeout = Duration::from_secs(commands.timeout_secs.max(1));

    let builder = Arc::new(
        CommandBuilder::new(commands.build.clone(), timeout)
            .with_build_log(commands.build_log.clone()),
    );
    let mut orchestrator = Orchestrator::new(
        Arc::new(CommandGenerator::new(
            commands.generator.clone(),
            commands.artifact_path.clone(),
            timeout,
        )),
        Arc::new(EslintChecker::new(
            commands.static_check.clone(),
            output_root,
            timeout,
        )),
        builder.clone(),
    )
    .with_templates(config.prompts.clone())
    .with_strategy(strategy);

    if strategy == BuildFailureStrategy::Repair {
        let repair = RepairPipeline::new(
            Arc::new(CommandAnalyzer::new(
                commands.analyzer.clone(),
                config.prompts.clone(),
                timeout,
            )),
            Arc::new(CommandFixer::new(
                commands.fixer.clone(),
                config.prompts.clone(),
                timeout,
            )),
            builder,
        );
        orchestrator = orchestrator.with_repair(repair);
    }

    if checkpoints {
        orchestrator = orchestrator.with_checkpoints(Arc::new(ConsoleCheckpoint::stdin()));
    }

    tracing::debug!(?strategy, checkpoints, "orchestrator wired");
    orchestrator
}
