use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use llmprobe_benchmark::report::preview;
use llmprobe_benchmark::{
    compare, parse_line, prompt_set, render_comparison, render_log_entry, render_log_summary,
    render_record, render_sample, render_statistics, BenchmarkEvent, BenchmarkRun, BenchmarkRunner, LogSummary,
    ReportOptions, RequestExecutor, ResultStore, PROMPT_SETS,
};
use llmprobe_core::{BackendConfig, BenchConfig, PromptConfig, RunRecord};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llmprobe")]
#[command(about = "llmprobe - latency and throughput probe for OpenAI-compatible inference servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark one or more backends and save a record per backend
    Run(RunArgs),

    /// Compare the latest saved runs of two backends
    Compare {
        /// Baseline backend name (A)
        baseline: String,

        /// Candidate backend name (B)
        candidate: String,

        /// Directory holding saved records
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Config file, used for its results_dir
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Summarize TTFT, latency and throughput lines from a server log
    Logs {
        /// Log file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Check that every configured backend answers /v1/models
    Status(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// JSON config file with backends, request settings and prompts
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend endpoint; replaces the backends from the config file
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Model name sent in each request (required with --endpoint)
    #[arg(short, long)]
    model: Option<String>,

    /// Display name for --endpoint
    #[arg(short, long)]
    backend: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Image URL or data: URI attached to every user message
    #[arg(long)]
    image_url: Option<String>,

    /// Single user prompt used for every round
    #[arg(long)]
    prompt: Option<String>,

    /// System prompt paired with --prompt
    #[arg(long, requires = "prompt")]
    system_prompt: Option<String>,

    /// Built-in prompt set (default, short, vision)
    #[arg(long, conflicts_with = "prompt")]
    prompts: Option<String>,

    /// Number of rounds
    #[arg(short, long)]
    repeat: Option<usize>,

    /// Max tokens to generate
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Temperature for generation
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Disable streaming (no TTFT measurement)
    #[arg(long)]
    no_stream: bool,

    /// Directory for saved records
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Do not write records to disk
    #[arg(long)]
    no_save: bool,

    /// Response preview length in characters (0 hides it)
    #[arg(long)]
    preview_chars: Option<usize>,

    /// Pause between consecutive requests in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Free-form note stored with each record
    #[arg(short, long)]
    description: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Compare {
            baseline,
            candidate,
            results_dir,
            config,
        } => cmd_compare(&baseline, &candidate, results_dir, config.as_deref()),
        Commands::Logs { file } => cmd_logs(file.as_deref()),
        Commands::Status(target) => cmd_status(&target).await,
    }
}

fn load_config(target: &TargetArgs) -> Result<BenchConfig> {
    let mut config = match &target.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BenchConfig::default(),
    };

    if let Some(endpoint) = &target.endpoint {
        let Some(model) = &target.model else {
            bail!("--model is required with --endpoint");
        };
        config.backends = vec![BackendConfig {
            name: target.backend.clone().unwrap_or_else(|| "default".to_string()),
            endpoint: endpoint.clone(),
            model: model.clone(),
        }];
    } else if target.model.is_some() || target.backend.is_some() {
        bail!("--model and --backend only apply together with --endpoint");
    }

    if config.backends.is_empty() {
        bail!("No backends configured. Pass --config <file> or --endpoint <url> --model <name>");
    }
    Ok(config)
}

/// Layers the `run` flags over a loaded config. Flags left unset keep the
/// config's value.
fn apply_run_overrides(config: &mut BenchConfig, args: &RunArgs) {
    if let Some(url) = &args.image_url {
        config.image_url = Some(url.clone());
    }
    if let Some(user) = &args.prompt {
        config.prompts = vec![PromptConfig {
            label: None,
            system: args.system_prompt.clone(),
            user: user.clone(),
        }];
    }
    if let Some(n) = args.repeat {
        config.run.repeat_count = n;
    }
    if let Some(n) = args.max_tokens {
        config.request.max_tokens = n;
    }
    if let Some(t) = args.temperature {
        config.request.temperature = t;
    }
    if args.no_stream {
        config.request.stream = false;
    }
    if let Some(n) = args.preview_chars {
        config.run.preview_chars = n;
    }
    if let Some(ms) = args.pause_ms {
        config.run.pause_ms = ms;
    }
    if let Some(secs) = args.timeout_secs {
        config.request.timeout_secs = secs;
    }
    if let Some(d) = &args.description {
        config.run.description = d.clone();
    }
    if let Some(dir) = &args.results_dir {
        config.results_dir = Some(dir.clone());
    }
}

/// A run fails only when no backend produced a sample; individual request
/// failures are reported but do not change the outcome.
fn run_succeeded(run: &BenchmarkRun) -> bool {
    !run.samples.is_empty()
}

/// Saves every record, reporting failures instead of stopping at the first.
/// Returns how many records could not be written.
fn save_records(store: &ResultStore, records: &[RunRecord]) -> usize {
    let mut failed = 0;
    for record in records {
        match store.save(record) {
            Ok(path) => println!("Saved {} results to {}", record.backend(), path.display()),
            Err(e) => {
                failed += 1;
                eprintln!("Failed to save {} results to {}: {}", record.backend(), store.root().display(), e);
            }
        }
    }
    failed
}

async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.target)?;
    apply_run_overrides(&mut config, &args);

    let prompts = match &args.prompts {
        Some(set) => prompt_set(set, config.image_url.as_deref())?,
        None if !config.prompts.is_empty() => config.build_prompts(),
        None => prompt_set("default", config.image_url.as_deref())?,
    };

    let runner = BenchmarkRunner::from_config(&config)?;
    let opts = ReportOptions {
        preview_chars: config.run.preview_chars,
    };

    println!();
    println!("Running benchmark...");
    for exec in runner.executors() {
        println!("  {}: {} @ {}", exec.name(), exec.model(), exec.chat_url());
    }
    println!("  Rounds: {}", config.run.repeat_count);
    println!("  Mode: {}", if config.request.stream { "streaming" } else { "non-streaming" });
    println!("  Max tokens: {}", config.request.max_tokens);
    if let Some(url) = &config.image_url {
        println!("  Image: {}", preview(url, 60));
    }
    println!();

    let run = runner
        .run(&prompts, config.run.repeat_count, |event| match event {
            BenchmarkEvent::RoundStarted { round, total, prompt } => {
                println!("Round {}/{}: {}", round + 1, total, preview(&prompt.label, 60));
            }
            BenchmarkEvent::SampleRecorded(sample) => {
                print!("{}", render_sample(sample, &opts));
            }
            BenchmarkEvent::RequestFailed {
                round,
                backend,
                error,
            } => {
                println!("  [{}] Round {} FAILED ({}): {}", backend, round + 1, error.kind(), error);
            }
        })
        .await?;

    let records = runner.records(&run, Utc::now())?;

    println!();
    println!("{:=<80}", "");
    println!("RESULTS");
    println!("{:=<80}", "");
    for record in &records {
        print!("{}", render_statistics(record.backend(), record.statistics()));
    }

    if !run.failures.is_empty() {
        println!();
        println!("Failed requests: {}", run.failures.len());
        for f in &run.failures {
            println!("  Round {} [{}]: {}", f.round + 1, f.backend, f.error);
        }
    }

    if let [a, b, ..] = records.as_slice() {
        println!();
        print!("{}", render_comparison(&compare(a, b)));
    }

    if !args.no_save && !records.is_empty() {
        let store = ResultStore::open(config.results_dir.as_deref());
        println!();
        save_records(&store, &records);
    }
    println!();

    if !run_succeeded(&run) {
        eprintln!("No successful requests; nothing was recorded");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_compare(
    baseline: &str,
    candidate: &str,
    results_dir: Option<PathBuf>,
    config: Option<&Path>,
) -> Result<ExitCode> {
    let config_dir = match config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?
            .results_dir,
        None => None,
    };
    let store = ResultStore::open(results_dir.or(config_dir).as_deref());
    let opts = ReportOptions::default();

    let a = store.load_latest(baseline)?;
    let b = store.load_latest(candidate)?;

    match (a, b) {
        (Some(a), Some(b)) => {
            print!("{}", render_record(&a, &opts));
            println!();
            print!("{}", render_record(&b, &opts));
            println!();
            print!("{}", render_comparison(&compare(&a, &b)));
        }
        (Some(found), None) | (None, Some(found)) => {
            let missing = if found.backend() == baseline { candidate } else { baseline };
            print!("{}", render_record(&found, &opts));
            println!();
            println!("No saved results for '{}' in {}; comparison unavailable", missing, store.root().display());
        }
        (None, None) => {
            eprintln!(
                "No saved results for '{}' or '{}' in {}",
                baseline,
                candidate,
                store.root().display()
            );
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_logs(file: Option<&Path>) -> Result<ExitCode> {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => {
            println!("Reading from stdin...");
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let Some(entry) = parse_line(line.trim()) else {
            continue;
        };
        if entry.is_notable() {
            println!("{}", render_log_entry(&entry));
        }
        entries.push(entry);
    }

    println!();
    print!("{}", render_log_summary(&LogSummary::from_entries(&entries)));
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(target: &TargetArgs) -> Result<ExitCode> {
    let config = load_config(target)?;

    println!("Backend Status:");
    println!("{:-<60}", "");

    let mut reachable = 0;
    for backend in &config.backends {
        let exec = match RequestExecutor::new(backend, &config.request) {
            Ok(exec) => exec,
            Err(e) => {
                println!("  {}: invalid ({})", backend.name, e);
                continue;
            }
        };

        match exec.probe().await {
            Ok(models) => {
                reachable += 1;
                let served = if models.iter().any(|m| m == exec.model()) {
                    "serving"
                } else {
                    "model not listed"
                };
                println!(
                    "  {}: connected, {} ({} models: {})",
                    exec.name(),
                    served,
                    models.len(),
                    models.join(", ")
                );
            }
            Err(e) => println!("  {}: disconnected ({})", exec.name(), e),
        }
    }

    println!();
    println!("Prompt sets: {}", PROMPT_SETS.join(", "));

    if reachable == 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
