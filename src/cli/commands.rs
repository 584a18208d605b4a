//! CLI command definitions for exercise-forge.
//!
//! Each subcommand is a thin shell over the library: read JSON inputs, call
//! the planner, generator or judge, and print JSON results.

use crate::contracts::{ActivitySpec, Language};
use crate::generation::{
    propose_generation_fallback, GeneratorConfig, HeartbeatMonitor, HintGenerator, Orchestrator,
    ProgressBus, SlotGenerator,
};
use crate::judge::{run_code, DockerCli, DockerJudge, JudgeAdapter, JudgeConfig, Submission};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::planner::{apply_pedagogy_curve, derive_plan, linear_decay};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Interval between heartbeats while a generation run is active.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Programming exercise generator with sandboxed reference validation.
#[derive(Parser)]
#[command(name = "exercise-forge")]
#[command(about = "Generate verified programming exercises for Java, Python, C++ and SQL")]
#[command(version)]
#[command(
    long_about = "exercise-forge turns an activity spec into a plan of problem slots, asks a model for each problem, and only keeps problems whose hidden reference solution passes its own test suite in a sandbox.\n\nExample usage:\n  exercise-forge plan spec.json\n  exercise-forge generate spec.json --output problems.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Print the deterministic slot plan for an activity spec.
    Plan(PlanArgs),

    /// Generate and validate every problem of an activity spec.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Judge a solution against a test suite in the sandbox.
    Judge(JudgeArgs),

    /// Run a program without tests.
    Run(RunArgs),

    /// Propose the next deterministic spec fallback.
    Fallback(FallbackArgs),
}

/// Arguments for `exercise-forge plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Path to an ActivitySpec file (JSON, or YAML by extension).
    pub spec: PathBuf,

    #[command(flatten)]
    pub guided: GuidedArgs,
}

/// Guided-mode pedagogy stamped onto the plan.
#[derive(clap::Args, Debug, Default)]
pub struct GuidedArgs {
    /// Scaffold level (0-100) for the first slot. Enables guided mode.
    #[arg(long)]
    pub scaffold_start: Option<u8>,

    /// Scaffold level (0-100) for the last slot.
    #[arg(long, requires = "scaffold_start")]
    pub scaffold_end: Option<u8>,

    /// Learning goal shown in TODO comments.
    #[arg(long, requires = "scaffold_start")]
    pub learning_goal: Option<String>,

    /// Disable hint comments in scaffolds.
    #[arg(long)]
    pub no_hints: bool,
}

/// Arguments for `exercise-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Path to an ActivitySpec file (JSON, or YAML by extension).
    pub spec: PathBuf,

    /// Write problems here instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Model for slot generation (defaults to CODEX_MODEL, then the client default).
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Stream progress events to stderr as JSON lines.
    #[arg(long)]
    pub progress: bool,

    #[command(flatten)]
    pub guided: GuidedArgs,
}

/// Arguments for `exercise-forge judge`.
#[derive(Parser, Debug)]
pub struct JudgeArgs {
    /// Language of the submission (java, python, cpp, sql).
    #[arg(long)]
    pub language: Language,

    /// Solution source file.
    #[arg(long)]
    pub solution: PathBuf,

    /// Test suite file.
    #[arg(long)]
    pub tests: PathBuf,
}

/// Arguments for `exercise-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Language of the program (java, python, cpp, sql).
    #[arg(long)]
    pub language: Language,

    /// Source files, written into the sandbox under their file names.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// File whose content is fed to the program on stdin.
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// Java class to launch (inferred from the sources when omitted).
    #[arg(long)]
    pub main_class: Option<String>,
}

/// Arguments for `exercise-forge fallback`.
#[derive(Parser, Debug)]
pub struct FallbackArgs {
    /// Path to an ActivitySpec file (JSON, or YAML by extension).
    pub spec: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Plan(args) => run_plan_command(args),
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Judge(args) => run_judge_command(args).await,
        Commands::Run(args) => run_run_command(args).await,
        Commands::Fallback(args) => run_fallback_command(args),
    }
}

fn load_spec(path: &Path) -> anyhow::Result<ActivitySpec> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let spec: ActivitySpec = if is_yaml {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse spec {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse spec {}", path.display()))?
    };
    spec.validate()
        .map_err(|e| anyhow::anyhow!("Invalid activity spec: {}", e))?;
    Ok(spec)
}

fn load_plan(spec: &ActivitySpec, guided: &GuidedArgs) -> anyhow::Result<Vec<crate::contracts::ProblemSlot>> {
    let mut slots = derive_plan(spec)?;
    if let Some(start) = guided.scaffold_start {
        let end = guided.scaffold_end.unwrap_or(start);
        apply_pedagogy_curve(
            &mut slots,
            guided.learning_goal.as_deref(),
            !guided.no_hints,
            linear_decay(start, end),
        );
    }
    Ok(slots)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn run_plan_command(args: PlanArgs) -> anyhow::Result<()> {
    let spec = load_spec(&args.spec)?;
    let slots = load_plan(&spec, &args.guided)?;
    print_json(&slots)
}

fn build_llm_client() -> anyhow::Result<Arc<dyn LlmProvider>> {
    let client = LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Please set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?;
    Ok(Arc::new(client))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationOutput {
    status: String,
    problems: Vec<crate::contracts::GeneratedProblem>,
    outcomes: Vec<crate::generation::GenerationOutcome>,
    total_duration_ms: u64,
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let spec = load_spec(&args.spec)?;
    let slots = load_plan(&spec, &args.guided)?;

    let llm = build_llm_client()?;
    let mut config = GeneratorConfig::from_env();
    if let Some(model) = args.model.clone() {
        config.model = model;
    }
    let hints = HintGenerator::from_env(llm.clone(), config.model.clone());
    let judge: Arc<dyn JudgeAdapter> = Arc::new(DockerJudge::new(JudgeConfig::from_env()));

    let bus = ProgressBus::new();
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut orchestrator =
        Orchestrator::new(SlotGenerator::new(llm, config), judge).with_hints(hints);
    let mut printer = None;
    let mut heartbeat = None;
    if args.progress {
        orchestrator = orchestrator.with_progress(bus.publisher(session_id.clone()));
        let mut subscription = bus.subscribe(&session_id);
        printer = Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
                if event.is_terminal() {
                    break;
                }
            }
        }));
        heartbeat = Some(HeartbeatMonitor::start(
            bus.clone(),
            session_id.clone(),
            HEARTBEAT_INTERVAL,
        ));
    }

    info!(
        language = spec.language.as_str(),
        "Generating {} problems",
        slots.len()
    );
    let start = Instant::now();
    let result = orchestrator.generate_from_plan(&slots).await;

    if let Some(monitor) = heartbeat {
        monitor.stop().await;
    }
    if let Some(handle) = printer {
        let _ = handle.await;
    }

    let run = match result {
        Ok(run) => run,
        Err(failure) => {
            warn!(
                slot_index = failure.slot_index,
                kind = failure.kind.as_str(),
                "Generation failed"
            );
            eprintln!("{}", serde_json::to_string_pretty(&failure)?);
            if let Some(fallback) = propose_generation_fallback(&spec) {
                eprintln!("Suggested fallback: {}", fallback.reason);
            }
            return Err(failure.into());
        }
    };

    let output = GenerationOutput {
        status: "success".to_string(),
        problems: run.problems,
        outcomes: run.outcomes,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    match args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, serde_json::to_string_pretty(&output)?)?;
            info!("Wrote {} problems to {}", output.problems.len(), path.display());
            Ok(())
        }
        None => print_json(&output),
    }
}

async fn run_judge_command(args: JudgeArgs) -> anyhow::Result<()> {
    let solution = fs::read_to_string(&args.solution)
        .with_context(|| format!("Failed to read {}", args.solution.display()))?;
    let tests = fs::read_to_string(&args.tests)
        .with_context(|| format!("Failed to read {}", args.tests.display()))?;

    let judge = DockerJudge::new(JudgeConfig::from_env());
    let result = judge
        .judge(args.language, &Submission::Code(solution), &tests)
        .await;
    print_json(&result)?;
    if !result.success {
        anyhow::bail!("Judge reported failure");
    }
    Ok(())
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push((name.to_string(), content));
    }
    let stdin = args
        .stdin
        .as_ref()
        .map(fs::read_to_string)
        .transpose()
        .context("Failed to read stdin file")?;

    let output = run_code(
        &DockerCli::default(),
        &JudgeConfig::from_env(),
        args.language,
        &Submission::files(files),
        stdin.as_deref(),
        args.main_class.as_deref(),
    )
    .await;
    print_json(&output)
}

fn run_fallback_command(args: FallbackArgs) -> anyhow::Result<()> {
    let spec = load_spec(&args.spec)?;
    match propose_generation_fallback(&spec) {
        Some(decision) => print_json(&decision),
        None => {
            println!("No fallback applies.");
            Ok(())
        }
    }
}
