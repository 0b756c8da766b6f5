//! `genloop` binary
//!
//! Telemetry is written to stdout as newline-delimited JSON; logs go to
//! stderr. The exit status is 0 for a completed session and 1 otherwise.

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use genloop_core::{
    BuildFailureStrategy, DonePayload, GenloopConfig, PipelineContext, DEFAULT_CONFIG_FILE,
};
use genloop_pipeline::{ChannelSink, Frame, Heartbeat, ParsedRequest, TestSession};
use genloop_report::{write_summary, ReportReducer, StabilityPolicy};
use genloop_runner::RunRequest;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

mod logging;
mod wiring;

const DEFAULT_CATEGORY: &str = "GenCode";
const CHANNEL_CAPACITY: usize = 256;

fn cli() -> Command {
    let config = Arg::new("config")
        .long("config")
        .short('c')
        .global(true)
        .value_parser(value_parser!(PathBuf))
        .help("Configuration file (default: ./genloop.toml when present)");
    let verbose = Arg::new("verbose")
        .long("verbose")
        .short('v')
        .global(true)
        .action(ArgAction::SetTrue)
        .help("Debug logging");

    Command::new("genloop")
        .version(genloop_pipeline::VERSION)
        .about("Generate, verify and repair source artifacts")
        .arg(config)
        .arg(verbose)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("generate")
                .about("Run the generate / check / build loop for one request")
                .arg(
                    Arg::new("prompt")
                        .value_name("PROMPT_FILE")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Request prompt file, or - for stdin"),
                )
                .arg(
                    Arg::new("category")
                        .long("category")
                        .help("Overrides the Category header"),
                )
                .arg(
                    Arg::new("build-check")
                        .long("build-check")
                        .action(ArgAction::SetTrue)
                        .help("Verify with a build even if the header does not ask for it"),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_parser(["reprompt", "repair"])
                        .help("Build failure strategy (overrides [pipeline])"),
                )
                .arg(
                    Arg::new("debug")
                        .long("debug")
                        .action(ArgAction::SetTrue)
                        .help("Stop at interactive checkpoints"),
                ),
        )
        .subcommand(
            Command::new("run-tests")
                .about("Run one test file and report its results")
                .arg(
                    Arg::new("test-file")
                        .value_name("TEST_FILE")
                        .required(true)
                        .help("Test file relative to the test directory"),
                )
                .arg(Arg::new("project").long("project").help("Runner project name")),
        )
        .subcommand(
            Command::new("reduce")
                .about("Reduce a raw test report into a summary")
                .arg(
                    Arg::new("report")
                        .value_name("REPORT")
                        .value_parser(value_parser!(PathBuf))
                        .help("Report file (default: from the results layout)"),
                )
                .arg(
                    Arg::new("wait")
                        .long("wait")
                        .action(ArgAction::SetTrue)
                        .help("Wait for the report to become stable first"),
                ),
        )
        .subcommand(
            Command::new("archive")
                .about("Copy a file into a directory, versioning the previous copy")
                .arg(
                    Arg::new("source-dir")
                        .long("source-dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(Arg::new("file").long("file").required(true))
                .arg(
                    Arg::new("dest-dir")
                        .long("dest-dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    match run(&matches).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}

/// `Ok(true)` when the command succeeded
async fn run(matches: &ArgMatches) -> Result<bool> {
    let config = load_config(matches.get_one::<PathBuf>("config"))?;
    logging::init(&config.logging, matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("generate", args)) => generate(&config, args).await,
        Some(("run-tests", args)) => run_tests(&config, args).await,
        Some(("reduce", args)) => reduce(&config, args).await,
        Some(("archive", args)) => archive(args),
        _ => Ok(false),
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<GenloopConfig> {
    let default = Path::new(DEFAULT_CONFIG_FILE);
    let path = explicit
        .map(PathBuf::as_path)
        .or_else(|| default.is_file().then_some(default));
    GenloopConfig::load(path).context("loading configuration")
}

fn read_prompt(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading prompt from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading prompt {}", path.display()))
}

async fn generate(config: &GenloopConfig, args: &ArgMatches) -> Result<bool> {
    let prompt_path = args
        .get_one::<PathBuf>("prompt")
        .context("prompt file is required")?;
    let request = ParsedRequest::parse(&read_prompt(prompt_path)?);

    let category = args
        .get_one::<String>("category")
        .map(String::as_str)
        .or(request.category())
        .unwrap_or(DEFAULT_CATEGORY);
    let build_check = args.get_flag("build-check") || request.build_check();
    let strategy = match args.get_one::<String>("strategy").map(String::as_str) {
        Some("repair") => BuildFailureStrategy::Repair,
        Some(_) => BuildFailureStrategy::Reprompt,
        None => config.pipeline.build_failure_strategy,
    };
    let checkpoints = args.get_flag("debug") || config.pipeline.debug_checkpoints;

    let mut ctx = PipelineContext::create(category, build_check, config)?;
    tracing::info!(step_id = %ctx.step_id, category, build_check, ?strategy, "generate request");
    let orchestrator = wiring::orchestrator(config, ctx.output_root(), strategy, checkpoints);

    let (done, written) = stream(config, |sink| async move {
        orchestrator.run(&request.body, &mut ctx, &sink).await
    })
    .await?;
    tracing::debug!(frames = written, "telemetry flushed");
    Ok(done.is_completed())
}

async fn run_tests(config: &GenloopConfig, args: &ArgMatches) -> Result<bool> {
    let test_file = args
        .get_one::<String>("test-file")
        .context("test file is required")?;
    let request = RunRequest::new(config.runner.test_dir.clone(), test_file.clone())
        .with_project(args.get_one::<String>("project").cloned());

    let mut ctx = PipelineContext::create("RunTests", false, config)?;
    let session = TestSession::from_config(&config.runner);

    let (done, _) = stream(config, |sink| async move {
        session.run(&request, &mut ctx, &sink).await
    })
    .await?;
    Ok(done.is_completed())
}

async fn reduce(config: &GenloopConfig, args: &ArgMatches) -> Result<bool> {
    let report = match args.get_one::<PathBuf>("report") {
        Some(path) => path.clone(),
        None => config.results.report_path(&config.workspace.output_dir),
    };

    let suite = if args.get_flag("wait") {
        ReportReducer::new(StabilityPolicy::from_millis(
            config.runner.stability_timeout_ms,
            config.runner.stability_interval_ms,
        ))
        .reduce(&report, None)
        .await?
    } else {
        genloop_report::parse_report_file(&report)?
    };
    let summary = write_summary(&suite, &report)?;
    tracing::info!(summary = %summary.display(), "summary written");

    println!("{}", serde_json::to_string_pretty(&suite)?);
    Ok(suite.passed)
}

fn archive(args: &ArgMatches) -> Result<bool> {
    let source_dir = args
        .get_one::<PathBuf>("source-dir")
        .context("--source-dir is required")?;
    let file = args.get_one::<String>("file").context("--file is required")?;
    let dest_dir = args
        .get_one::<PathBuf>("dest-dir")
        .context("--dest-dir is required")?;

    let written = genloop_archive::archive(source_dir, file, dest_dir)?;
    println!("{}", written.display());
    Ok(true)
}

/// Run a session against a channel sink, forwarding frames and heartbeats
/// to stdout until the session finishes.
///
/// Returns the terminal outcome and the number of frames written.
async fn stream<F, Fut>(config: &GenloopConfig, session: F) -> Result<(DonePayload, usize)>
where
    F: FnOnce(ChannelSink) -> Fut,
    Fut: std::future::Future<Output = DonePayload>,
{
    let (sink, rx) = ChannelSink::channel(CHANNEL_CAPACITY);
    let heartbeat = Heartbeat::spawn(
        sink.sender(),
        Duration::from_secs(config.pipeline.heartbeat_secs.max(1)),
    );
    let writer = tokio::spawn(write_frames(rx));

    let done = session(sink).await;
    heartbeat.stop();

    let written = writer.await.context("telemetry writer panicked")??;
    Ok((done, written))
}

async fn write_frames(mut rx: mpsc::Receiver<Frame>) -> Result<usize> {
    let mut stdout = tokio::io::stdout();
    let mut written = 0;
    while let Some(frame) = rx.recv().await {
        stdout.write_all(frame.to_json_line()?.as_bytes()).await?;
        stdout.flush().await?;
        written += 1;
    }
    Ok(written)
}
