use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use topk_client::{HttpTransport, DEFAULT_TIMEOUT};
use topk_core::strategy::STRATEGY_NAMES;
use topk_core::{ExecutionDriver, SparqlClauses, StrategyConfig, StrategyKind};
use tracing_subscriber::EnvFilter;

mod compare;
mod config;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "topk")]
#[command(about = "Top-K query collaboration benchmark")]
struct Cli {
    /// Log progress at info level (RUST_LOG overrides).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute one Top-K query with the selected strategy.
    Run(Box<RunArgs>),
    /// Check a result file against a reference result file.
    Compare(CompareArgs),
    /// List accepted strategy names.
    Strategies,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// File holding the SPARQL query.
    query_file: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Service endpoint; overrides `endpoints.sage.url`.
    #[arg(long)]
    endpoint: Option<String>,
    /// Default graph; overrides `endpoints.sage.graph`.
    #[arg(long)]
    graph: Option<String>,
    #[arg(long, default_value = "client-merge")]
    strategy: String,
    #[arg(long)]
    refresh_rate: Option<f64>,
    /// K; defaults to the query's own LIMIT.
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    max_limit: Option<u64>,
    /// Per-round time quota in milliseconds.
    #[arg(long)]
    quota: Option<u64>,
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    early_pruning: bool,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    stateless: bool,
    #[arg(long, default_value_t = false)]
    force_order: bool,
    /// Write the solutions to this file as a JSON array.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write the execution statistics to this file.
    #[arg(long)]
    stats: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CompareArgs {
    reference: PathBuf,
    actual: PathBuf,
    #[arg(long)]
    output: Option<PathBuf>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Run(args) => run_query(&args),
        Command::Compare(args) => run_compare(&args),
        Command::Strategies => run_strategies(),
    }
}

fn query_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or_default()
        .to_string()
}

fn run_query(args: &RunArgs) -> Result<()> {
    let query = fs::read_to_string(&args.query_file)
        .with_context(|| format!("failed to read query file {}", args.query_file.display()))?;
    let bench_config = args.config.as_deref().map(config::load).transpose()?;

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| bench_config.as_ref().map(|config| config.endpoints.sage.url.clone()))
        .ok_or_else(|| anyhow!("no service endpoint: pass --endpoint or --config"))?;
    let graph = args
        .graph
        .clone()
        .or_else(|| bench_config.as_ref().map(|config| config.endpoints.sage.graph.clone()))
        .ok_or_else(|| anyhow!("no default graph: pass --graph or --config"))?;
    let timeout = bench_config
        .as_ref()
        .and_then(|config| config.http.timeout())
        .unwrap_or(DEFAULT_TIMEOUT);

    let kind = StrategyKind::from_name(&args.strategy, args.refresh_rate)?;
    let strategy_config = StrategyConfig {
        default_graph: graph,
        limit: args.limit,
        quota: args.quota,
        max_limit: args.max_limit,
        stateless: args.stateless,
        early_pruning: args.early_pruning,
        force_order: args.force_order,
    };

    let transport = HttpTransport::with_timeout(endpoint, timeout);
    let evaluator = SparqlClauses::new()?;
    let driver = ExecutionDriver::new(&transport, &evaluator);
    let name = query_name(&args.query_file);
    let outcome = driver
        .execute(&query, kind, &strategy_config)
        .with_context(|| format!("query `{name}` failed with strategy {kind}"))?;

    tracing::info!(
        strategy = %kind,
        seconds = outcome.metrics.execution_time / 1000.0,
        solutions = outcome.solutions.len(),
        "query executed"
    );

    let solutions = serde_json::to_value(&outcome.solutions)?;
    let metrics = serde_json::to_value(outcome.metrics)?;

    if let Some(path) = &args.output {
        write_json(path, &solutions)?;
    }
    if let Some(path) = &args.stats {
        let recorded_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("failed to format statistics timestamp")?;
        let mut stats = json!({
            "query": name,
            "strategy": kind.as_str(),
            "recorded_at": recorded_at,
        });
        if let (Value::Object(stats), Value::Object(metrics)) = (&mut stats, &metrics) {
            stats.extend(metrics.clone());
        }
        write_json(path, &stats)?;
    }

    emit_json(json!({
        "command": "run",
        "query": name,
        "strategy": kind.as_str(),
        "topk_strategy": kind.selector().map(|selector| selector.to_wire()),
        "metrics": metrics,
        "solutions": solutions,
    }))
}

fn run_compare(args: &CompareArgs) -> Result<()> {
    let reference = compare::load_solutions(&args.reference)?;
    let actual = compare::load_solutions(&args.actual)?;
    let verdict = compare::compare(&reference, &actual)?;

    if verdict.correct {
        tracing::info!("the top-k is correct");
    } else {
        tracing::info!("the top-k is incorrect");
    }

    let mut value = serde_json::to_value(&verdict)?;
    if let Some(path) = &args.output {
        write_json(path, &value)?;
    }
    if let Value::Object(object) = &mut value {
        object.insert("command".to_string(), Value::String("compare".to_string()));
    }
    emit_json(value)
}

fn run_strategies() -> Result<()> {
    let strategies = STRATEGY_NAMES
        .iter()
        .map(|name| -> Result<Value> {
            let kind = StrategyKind::from_name(name, None)?;
            Ok(json!({
                "name": name,
                "strategy": kind.as_str(),
                "topk_strategy": kind.selector().map(|selector| selector.to_wire()),
                "threshold_pushdown": kind.pushes_threshold(),
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    emit_json(json!({
        "command": "strategies",
        "strategies": strategies,
    }))
}
