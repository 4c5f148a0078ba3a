//! prompt-eval CLI
//!
//! The `prompt-eval` command scores a candidate prompt against a fixture
//! file of test cases and inspects stored runs.
//!
//! ## Commands
//!
//! - `evaluate`: register a run and evaluate every test case
//! - `show`: print one run's per-test-case results
//! - `runs`: list registered runs, newest first

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use prompt_eval_core::metrics::METRICS;
use prompt_eval_core::{
    load_test_cases, CompletionClient, EmbeddingClient, EvalConfig, Evaluator, OpenAiClient,
    PromptCandidate, RetryPolicy, RunSummary,
};
use prompt_eval_state::{
    PromptTestResults, RunId, RunParams, RunRegistry, SurrealResultStore, TestResultRecord,
};

#[derive(Parser)]
#[command(name = "prompt-eval")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Score prompt templates against reference completions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a prompt against every test case in a fixture file
    Evaluate(EvaluateArgs),

    /// Show the results of a run
    Show {
        /// Run ID
        run_id: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List runs, newest first
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Args, Debug, Clone)]
struct EvaluateArgs {
    /// Fixture file: JSON array of test cases
    #[arg(short, long)]
    fixtures: PathBuf,

    /// Prompt template text
    #[arg(short, long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the prompt template from a file
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Identifier recorded with the run
    #[arg(long)]
    prompt_id: Option<String>,

    /// Completion model
    #[arg(long, default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Embeddings model
    #[arg(long, default_value = "text-embedding-3-small")]
    embeddings_model: String,

    /// Sampling temperature
    #[arg(long, default_value = "0.7")]
    temperature: f64,

    /// Token limit per completion
    #[arg(long, default_value = "256")]
    max_tokens: u32,

    /// Test cases evaluated at once
    #[arg(short, long, default_value = "4")]
    concurrency: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    prompt_eval_core::telemetry::init_tracing(cli.json, level);

    let store = SurrealResultStore::from_env()
        .await
        .context("Failed to connect to the result store")?;

    match cli.command {
        Commands::Evaluate(args) => {
            let config = EvalConfig::from_env().context("Invalid evaluation configuration")?;
            let client = Arc::new(
                OpenAiClient::new(config.openai.clone()).context("Failed to build HTTP client")?,
            );

            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let summary = cmd_evaluate(
                &store,
                client.clone(),
                client,
                config.retry,
                cancel,
                &args,
            )
            .await?;
            METRICS.flush();

            if summary.errored > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Show { run_id, format } => cmd_show(&store, &run_id, format).await,
        Commands::Runs { limit } => cmd_runs(&store, limit).await,
    }
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling in-flight evaluations");
            cancel.cancel();
        }
    });
}

fn read_prompt(args: &EvaluateArgs) -> Result<PromptCandidate> {
    let text = match (&args.prompt, &args.prompt_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .context(format!("Failed to read prompt file: {:?}", path))?,
        (None, None) => bail!("Either --prompt or --prompt-file is required"),
    };
    if text.trim().is_empty() {
        bail!("Prompt template is empty");
    }

    let mut prompt = PromptCandidate::new(text);
    prompt.id = args.prompt_id.clone();
    Ok(prompt)
}

/// Register a run and evaluate every fixture, at most `concurrency` at a time
async fn cmd_evaluate(
    store: &SurrealResultStore,
    completions: Arc<dyn CompletionClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    args: &EvaluateArgs,
) -> Result<RunSummary> {
    let prompt = read_prompt(args)?;
    let cases = load_test_cases(&args.fixtures)?;

    let run = store
        .create_run(RunParams {
            prompt_id: prompt.id.clone(),
            llm_model: args.llm_model.clone(),
            embeddings_model: args.embeddings_model.clone(),
            temperature: args.temperature,
            max_tokens: args.max_tokens,
        })
        .await
        .context("Failed to register run")?;
    let run_id = run
        .id
        .clone()
        .context("Registered run has no id")?;

    info!(run_id = %run_id, cases = cases.len(), "Starting evaluation");

    let evaluator = Evaluator::new(Arc::new(store.clone()), completions, embeddings)
        .with_retry_policy(retry)
        .with_cancellation(cancel);

    let receipts: Vec<_> = stream::iter(cases.iter())
        .map(|case| evaluator.process_test_case(case, &prompt, &run))
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    for receipt in receipts {
        let receipt = receipt?;
        if !receipt.recorded {
            warn!(test_case_id = %receipt.test_case_id, "Outcome was not recorded");
        }
    }

    let finished = store.get_run(&run_id).await?;
    let summary = RunSummary::from_run(&finished);

    match args.format {
        OutputFormat::Json => print_run_json(&finished, &summary)?,
        OutputFormat::Text => {
            println!("Run {}", run_id);
            print_summary(&summary);
        }
    }

    Ok(summary)
}

/// Show one run with all of its result records
async fn cmd_show(store: &SurrealResultStore, run_id: &str, format: OutputFormat) -> Result<()> {
    let run = store
        .get_run(&RunId(run_id.to_string()))
        .await
        .context(format!("Run not found: {}", run_id))?;
    let summary = RunSummary::from_run(&run);

    if format == OutputFormat::Json {
        return print_run_json(&run, &summary);
    }

    println!("Run {}", run_id);
    if let Some(prompt_id) = &run.params.prompt_id {
        println!("Prompt:      {}", prompt_id);
    }
    println!(
        "Models:      {} / {}",
        run.params.llm_model, run.params.embeddings_model
    );
    println!(
        "Created:     {}",
        run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    for record in run.test_results.values() {
        println!("  {}", format_record(record));
    }
    println!();
    print_summary(&summary);

    Ok(())
}

/// List registered runs
async fn cmd_runs(store: &SurrealResultStore, limit: usize) -> Result<()> {
    let runs = store.list_runs().await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    for run in runs.iter().take(limit) {
        let id = run.id.as_ref().map(RunId::as_str).unwrap_or("-");
        println!(
            "{}  {}  {}  {}",
            id,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.params.llm_model,
            run.params.prompt_id.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

fn format_record(record: &TestResultRecord) -> String {
    let id = record.test_case_id.as_str();
    let status = record.status.as_str();
    match (record.cosine_similarity_score, &record.error_message) {
        (Some(score), _) => format!("{:<24} {:<12} {:+.4}", id, status, score),
        (None, Some(message)) => format!("{:<24} {:<12} {}", id, status, message),
        (None, None) => format!("{:<24} {}", id, status),
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} test case(s): {} done, {} error, {} in progress",
        summary.total, summary.done, summary.errored, summary.in_progress
    );
    if let Some(mean) = summary.mean_score {
        println!("Mean similarity: {:.4}", mean);
    }
}

fn print_run_json(run: &PromptTestResults, summary: &RunSummary) -> Result<()> {
    let output = serde_json::json!({
        "run": run,
        "summary": summary,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompt_eval_core::clients::fakes::{FakeCompletionClient, FakeEmbeddingClient};
    use prompt_eval_state::ResultStatus;
    use std::time::Duration;

    const FIXTURES: &str = r#"[
      {
        "id": "gym",
        "bio": {"name": "Sam", "age": 30, "aboutMe": "Rock climber"},
        "context": {"tone": "friendly", "setting": "gym", "conversationType": "small talk"},
        "utterance": "Hey!",
        "goodCompletions": ["Hi Sam"]
      },
      {
        "id": "kitchen",
        "bio": {"name": "Ana", "age": 41, "aboutMe": "Chef"},
        "context": {"tone": "warm", "setting": "kitchen", "conversationType": "advice"},
        "utterance": "What should I cook?",
        "goodCompletions": ["Risotto"]
      }
    ]"#;

    fn args(dir: &tempfile::TempDir) -> EvaluateArgs {
        let fixtures = dir.path().join("cases.json");
        std::fs::write(&fixtures, FIXTURES).unwrap();
        EvaluateArgs {
            fixtures,
            prompt: Some("Reply to {name} in a {tone} way: {utterance}".to_string()),
            prompt_file: None,
            prompt_id: Some("reply-v2".to_string()),
            llm_model: "gpt-4o-mini".to_string(),
            embeddings_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            max_tokens: 32,
            concurrency: 2,
            format: OutputFormat::Text,
        }
    }

    #[tokio::test]
    async fn test_cmd_evaluate_records_every_case() {
        let store = SurrealResultStore::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let summary = cmd_evaluate(
            &store,
            Arc::new(FakeCompletionClient::replying(["Hello!"])),
            Arc::new(FakeEmbeddingClient::new(vec![0.0, 1.0]).with_vector("Risotto", vec![1.0, 0.0])),
            RetryPolicy::new(1, Duration::ZERO),
            CancellationToken::new(),
            &args(&dir),
        )
        .await
        .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.errored, 0);

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].params.prompt_id.as_deref(), Some("reply-v2"));

        let run = store.get_run(runs[0].id.as_ref().unwrap()).await.unwrap();
        let scores: Vec<f64> = run
            .test_results
            .values()
            .map(|r| r.cosine_similarity_score.unwrap())
            .collect();
        // "gym" matches its reference exactly, "kitchen" is orthogonal
        assert!((scores[0] - 1.0).abs() < 1e-9);
        assert!(scores[1].abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cmd_evaluate_cancelled_marks_errors() {
        let store = SurrealResultStore::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = cmd_evaluate(
            &store,
            Arc::new(FakeCompletionClient::hanging()),
            Arc::new(FakeEmbeddingClient::new(vec![1.0])),
            RetryPolicy::default(),
            cancel,
            &args(&dir),
        )
        .await
        .unwrap();

        assert_eq!(summary.errored, 2);
        let runs = store.list_runs().await.unwrap();
        let run = store.get_run(runs[0].id.as_ref().unwrap()).await.unwrap();
        for record in run.test_results.values() {
            assert_eq!(record.status, ResultStatus::Error);
            assert_eq!(record.error_message.as_deref(), Some("evaluation cancelled"));
        }
    }

    #[tokio::test]
    async fn test_cmd_show_unknown_run_fails() {
        let store = SurrealResultStore::in_memory().await.unwrap();
        assert!(cmd_show(&store, "missing", OutputFormat::Text).await.is_err());
    }

    #[test]
    fn test_read_prompt_requires_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(&dir);
        a.prompt = None;
        assert!(read_prompt(&a).is_err());

        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Hi {name}").unwrap();
        a.prompt_file = Some(path);
        assert_eq!(read_prompt(&a).unwrap().prompt, "Hi {name}");
    }

    #[test]
    fn test_format_record_shows_score() {
        let record = TestResultRecord {
            run_id: RunId("r".to_string()),
            test_case_id: prompt_eval_state::TestCaseId::new("gym"),
            status: ResultStatus::Done,
            error_message: None,
            cosine_similarity_score: Some(0.5),
            llm_completions: Some(vec!["x".to_string()]),
            updated_at: chrono::Utc::now(),
        };
        assert!(format_record(&record).ends_with("+0.5000"));
    }
}
