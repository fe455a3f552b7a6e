//! Spiral - bounded iterative scoring pipeline CLI
//!
//! ## Commands
//!
//! - `run`: score one text and print the terminal decision
//! - `batch`: score a JSON file of events concurrently
//! - `validate`: load the config file and print the effective settings
//! - `metrics`: print the metric vector computed for a text
//! - `history`: query records from a JSONL result store
//! - `stats`: aggregate statistics over a result store
//! - `prune`: drop old, low-importance records from a result store

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

use spiral_core::metrics::METRICS;
use spiral_core::store::days_ago;
use spiral_core::{
    load_config, run_batch_with, BatchOptions, BatchReport, Config, Decision, Event, Executor,
    FileConfig, IterationRecord, JsonlResultStore, MetricEngine, Mode, PipelineResult,
    ResultQuery, ResultRecord, ResultStore, RunControl, StandardMetricEngine, StoreStats,
};

#[derive(Parser)]
#[command(name = "spiral")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded iterative scoring pipeline", long_about = None)]
struct Cli {
    /// Path to the YAML config file (built-in defaults if it does not exist)
    #[arg(short, long, global = true, default_value = spiral_core::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the pipeline mode
    #[arg(short, long, global = true)]
    mode: Option<Mode>,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single text
    Run {
        /// Text to score
        #[arg(short, long)]
        text: String,

        /// Context entry as key=value (repeatable)
        #[arg(long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Append the result to this JSONL store
        #[arg(long)]
        store: Option<PathBuf>,

        /// Abort the run after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Score every event in a JSON file
    Batch {
        /// JSON array of strings or {"text", "context"} objects
        #[arg(short, long)]
        input: PathBuf,

        /// Maximum number of runs in flight
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Cancel the remaining runs after the first failure
        #[arg(long)]
        fail_fast: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Append every successful result to this JSONL store
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print aggregate statistics
        #[arg(long)]
        stats: bool,
    },

    /// Validate the config file and print the effective config
    Validate,

    /// Print the metric vector for a text
    Metrics {
        #[arg(short, long)]
        text: String,
    },

    /// List stored results, most important first
    History {
        #[arg(long)]
        store: PathBuf,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Only records with this final decision
        #[arg(long)]
        decision: Option<Decision>,

        /// Only records at or above this importance
        #[arg(long)]
        min_importance: Option<f64>,

        /// Only records from the last N days
        #[arg(long)]
        recent_days: Option<i64>,
    },

    /// Aggregate statistics over a result store
    Stats {
        #[arg(long)]
        store: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Delete old records whose importance is below a floor
    Prune {
        #[arg(long)]
        store: PathBuf,

        /// Keep everything newer than this many days
        #[arg(long, default_value = "30")]
        retention_days: i64,

        /// Keep older records at or above this importance
        #[arg(long, default_value = "0.3")]
        min_importance: f64,
    },
}

/// One entry of a batch input file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchInput {
    Text(String),
    Event(Event),
}

impl From<BatchInput> for Event {
    fn from(input: BatchInput) -> Self {
        match input {
            BatchInput::Text(text) => Event::new(text),
            BatchInput::Event(event) => event,
        }
    }
}

#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    record: &'a ResultRecord,
    iterations: &'a [IterationRecord],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut file, _) = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(mode) = cli.mode {
        file.pipeline.mode = mode;
    }
    let config = file.to_config().context("Invalid configuration")?;

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        file.logging.level().context("Invalid logging level")?
    };
    spiral_core::telemetry::init_tracing(cli.json || file.logging.is_json(), level);

    let outcome = match cli.command {
        Commands::Run {
            text,
            context,
            format,
            store,
            timeout_ms,
        } => cmd_run(&config, text, context, format, store.as_deref(), timeout_ms).await,
        Commands::Batch {
            input,
            concurrency,
            fail_fast,
            format,
            store,
            stats,
        } => {
            let options = BatchOptions {
                max_concurrent: concurrency,
                fail_fast,
            };
            cmd_batch(config, &input, options, format, store.as_deref(), stats).await
        }
        Commands::Validate => cmd_validate(&file, &config),
        Commands::Metrics { text } => cmd_metrics(&config, text),
        Commands::History {
            store,
            limit,
            decision,
            min_importance,
            recent_days,
        } => {
            let mut query = ResultQuery::new().limit(limit);
            query.decision = decision;
            query.min_importance = min_importance;
            if let Some(days) = recent_days {
                query = query.recent_days(days).context("Invalid --recent-days")?;
            }
            cmd_history(&store, &query).await
        }
        Commands::Stats { store, format } => cmd_stats(&store, format).await,
        Commands::Prune {
            store,
            retention_days,
            min_importance,
        } => cmd_prune(&store, retention_days, min_importance).await,
    };

    METRICS.flush();
    outcome
}

/// Parse a `key=value` pair.
fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_batch_input(raw: &str) -> Result<Vec<Event>> {
    let inputs: Vec<BatchInput> =
        serde_json::from_str(raw).context("Batch input must be a JSON array")?;
    Ok(inputs.into_iter().map(Event::from).collect())
}

fn print_result(record: &ResultRecord, result: &PipelineResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = RunOutput {
                record,
                iterations: &result.iterations,
            };
            println!("{}", serde_json::to_string(&output)?);
        }
        OutputFormat::Text => {
            println!(
                "{}  decision={} confidence={:.4} success={:.4} iterations={} mode={} time={:.2}ms",
                record.id,
                record.decision,
                record.confidence,
                record.success,
                record.iteration_count,
                record.mode,
                record.processing_time_ms,
            );
        }
    }
    Ok(())
}

/// Score a single text
async fn cmd_run(
    config: &Config,
    text: String,
    context: Vec<(String, String)>,
    format: OutputFormat,
    store: Option<&Path>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let event = context
        .into_iter()
        .fold(Event::new(text), |event, (k, v)| event.with_context(k, v));
    let control = match timeout_ms {
        Some(ms) => RunControl::with_timeout(Duration::from_millis(ms)),
        None => RunControl::new(),
    };

    let executor = Executor::standard();
    let (result, _) = executor
        .execute_with(&event, config, &control)
        .context("Pipeline run failed")?;
    let record = ResultRecord::from_result(&event, &result)?;

    if let Some(path) = store {
        JsonlResultStore::new(path)
            .append(&record)
            .await
            .with_context(|| format!("Failed to append to store {:?}", path))?;
    }

    print_result(&record, &result, format)
}

/// Score every event in a JSON file
async fn cmd_batch(
    config: Config,
    input: &Path,
    options: BatchOptions,
    format: OutputFormat,
    store: Option<&Path>,
    stats: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read batch input: {:?}", input))?;
    let events = parse_batch_input(&raw).with_context(|| format!("Invalid batch input {:?}", input))?;
    info!(events = events.len(), "starting batch");
    let fail_fast = options.fail_fast;

    let report: BatchReport = run_batch_with(
        Arc::new(Executor::standard()),
        events,
        Arc::new(config),
        options,
        RunControl::new(),
    )
    .await
    .context("Batch failed")?;

    let store = store.map(JsonlResultStore::new);
    for (index, item) in report.items.iter().enumerate() {
        match &item.outcome {
            Ok(result) => {
                let record = ResultRecord::from_result(&item.event, result)?;
                if let Some(store) = &store {
                    store
                        .append(&record)
                        .await
                        .with_context(|| format!("Failed to append to store {:?}", store.path()))?;
                }
                print_result(&record, result, format)?;
            }
            Err(e) => match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "index": index, "error": e.to_string() })
                ),
                OutputFormat::Text => println!("#{index}  error: {e}"),
            },
        }
    }

    if stats {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&report.summary)?),
            OutputFormat::Text => {
                let s = &report.summary;
                println!("batch {}", report.batch_id);
                println!("  count:            {}", s.count);
                println!("  failures:         {}", s.failures);
                println!("  cancelled:        {}", s.cancelled);
                println!("  mean confidence:  {:.4}", s.mean_confidence);
                println!("  mean success:     {:.4}", s.mean_success);
                println!("  total iterations: {}", s.total_iterations);
                println!("  total time:       {:.2}ms", s.total_processing_time_ms);
                for (decision, n) in &s.decisions {
                    println!("  {decision:<17} {n}");
                }
            }
        }
    }

    if fail_fast && report.summary.failures > 0 {
        bail!("batch aborted after a failed run");
    }
    Ok(())
}

fn validation_summary(config: &Config) -> [String; 2] {
    [
        format!(
            "# valid: mode={} max_iterations={} thresholds={}/{}",
            config.mode(),
            config.max_iterations(),
            config.confidence_threshold(),
            config.success_threshold(),
        ),
        format!("# {}: {}", config.mode(), config.mode().description()),
    ]
}

/// Load and validate the config, then print it
fn cmd_validate(file: &FileConfig, config: &Config) -> Result<()> {
    println!("{}", file.to_yaml()?);
    for line in validation_summary(config) {
        println!("{line}");
    }
    Ok(())
}

/// Print the metric vector for a text
fn cmd_metrics(config: &Config, text: String) -> Result<()> {
    let metrics = StandardMetricEngine
        .compute(&Event::new(text), config)
        .context("Metric computation failed")?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn history_line(record: &ResultRecord) -> String {
    format!(
        "{}  {}  {:<12} conf={:.4} succ={:.4} imp={:.4} iters={} mode={}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        record.id,
        record.decision.as_str(),
        record.confidence,
        record.success,
        record.importance,
        record.iteration_count,
        record.mode,
    )
}

/// Query stored results
async fn cmd_history(path: &Path, query: &ResultQuery) -> Result<()> {
    let records = JsonlResultStore::new(path)
        .query(query)
        .await
        .with_context(|| format!("Failed to read store {:?}", path))?;

    if records.is_empty() {
        println!("No matching results in {:?}", path);
        return Ok(());
    }

    for record in &records {
        println!("{}", history_line(record));
    }
    Ok(())
}

fn stats_lines(stats: &StoreStats) -> Vec<String> {
    let mut lines = vec![
        format!("  records:               {}", stats.count),
        format!("  mean confidence:       {:.4}", stats.mean_confidence),
        format!("  mean success:          {:.4}", stats.mean_success),
        format!("  mean importance:       {:.4}", stats.mean_importance),
        format!("  mean iterations:       {:.2}", stats.mean_iterations),
        format!("  acceptance rate:       {:.4}", stats.acceptance_rate),
        format!("  force acceptance rate: {:.4}", stats.force_acceptance_rate),
        format!("  rejection rate:        {:.4}", stats.rejection_rate),
        format!("  revision rate:         {:.4}", stats.revision_rate),
    ];
    for (decision, n) in &stats.decisions {
        lines.push(format!("  decision {decision:<13} {n}"));
    }
    for (mode, n) in &stats.mode_usage {
        lines.push(format!("  mode {mode:<17} {n}"));
    }
    lines
}

/// Aggregate statistics over a result store
async fn cmd_stats(path: &Path, format: OutputFormat) -> Result<()> {
    let stats = JsonlResultStore::new(path)
        .stats()
        .await
        .with_context(|| format!("Failed to read store {:?}", path))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&stats)?),
        OutputFormat::Text => {
            println!("store {:?}", path);
            for line in stats_lines(&stats) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// Drop old, low-importance records
async fn cmd_prune(path: &Path, retention_days: i64, min_importance: f64) -> Result<()> {
    let cutoff = days_ago(retention_days).context("Invalid --retention-days")?;
    let removed = JsonlResultStore::new(path)
        .prune(cutoff, min_importance)
        .await
        .with_context(|| format!("Failed to prune store {:?}", path))?;
    info!(removed, retention_days, min_importance, "store pruned");
    println!("Removed {removed} record(s) from {:?}", path);
    Ok(())
}
