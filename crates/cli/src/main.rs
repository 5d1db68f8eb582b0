use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use relay_engine::{EngineConfig, GraphDocument, graph, load_graph_document};
use tracing::{debug, warn};

mod render;
mod simulate;

use simulate::{SimulationConfig, simulate};

#[derive(Debug, Parser)]
#[command(name = "relay", version, about = "Inspect, plan, and simulate Relay task graphs")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,

    /// Engine settings file (YAML or JSON).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a task graph for duplicate ids, unknown dependencies, and cycles.
    Validate(GraphArgs),
    /// Print the execution order with depths and graph statistics.
    Plan(GraphArgs),
    /// Print graph statistics only.
    Stats(GraphArgs),
    /// Run the graph with placeholder tasks to preview skips and rollback.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
struct GraphArgs {
    /// Task graph file (YAML or JSON).
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Make this task fail when it runs.
    #[arg(long, value_name = "TASK")]
    fail: Option<String>,

    /// Skip this task (repeatable).
    #[arg(long, value_name = "TASK")]
    skip: Vec<String>,

    /// Leave completed tasks in place when a task fails.
    #[arg(long)]
    no_rollback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let engine_config = load_engine_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate(args) => run_validate(&args),
        Commands::Plan(args) => run_plan(&args),
        Commands::Stats(args) => run_stats(&args),
        Commands::Simulate(args) => run_simulate(args, engine_config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn load_document(path: &Path) -> Result<GraphDocument> {
    let document = load_graph_document(path)?;
    debug!(file = %path.display(), tasks = document.tasks.len(), "loaded task graph");
    Ok(document)
}

fn run_validate(args: &GraphArgs) -> Result<ExitCode> {
    let document = load_document(&args.file)?;
    let validation = graph::validate(&document.tasks);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&validation)?),
        OutputFormat::Text => println!("{}", render::validation_text(&document, &validation)),
    }
    Ok(if validation.is_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run_plan(args: &GraphArgs) -> Result<ExitCode> {
    let document = load_document(&args.file)?;
    let validation = graph::validate(&document.tasks);
    if !validation.is_valid {
        return Err(graph::graph_error(&validation)).with_context(|| format!("cannot plan {}", args.file.display()));
    }
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    let statistics = graph::statistics(&document.tasks);
    match args.format {
        OutputFormat::Json => {
            let plan = render::plan_json(&document, &validation, &statistics);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        OutputFormat::Text => println!("{}", render::plan_text(&document, &validation, &statistics)),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_stats(args: &GraphArgs) -> Result<ExitCode> {
    let document = load_document(&args.file)?;
    let statistics = graph::statistics(&document.tasks);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statistics)?),
        OutputFormat::Text => println!("{}", render::statistics_text(&statistics)),
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_simulate(args: SimulateArgs, mut engine_config: EngineConfig) -> Result<ExitCode> {
    let document = load_document(&args.graph.file)?;
    if args.no_rollback {
        engine_config.rollback_on_failure = false;
    }
    let config = SimulationConfig {
        fail: args.fail,
        skip: args.skip,
    };

    let (outcome, events) = simulate(document, engine_config, config).await;
    let result = match &outcome {
        Ok(result) => result,
        Err(error) => match error.execution_result() {
            Some(result) => result,
            None => return Err(anyhow::anyhow!("{error}")).context("simulation did not start"),
        },
    };

    match args.graph.format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "events": events, "result": result });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for event in &events {
                println!("{}", render::event_line(event));
            }
            println!("{}", render::result_text(result));
        }
    }
    Ok(if outcome.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
