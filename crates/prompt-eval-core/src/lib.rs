//! prompt-eval-core: scoring candidate prompts against reference answers.
//!
//! A prompt template is expanded with each test case's persona and
//! context, sent to a completion model, and the resulting completions are
//! compared with the test case's good completions by cosine similarity of
//! their averaged embeddings. Progress and outcome of every test case are
//! written to a [`prompt_eval_state::ResultStore`].
//!
//! ## Modules
//!
//! - [`template`]: single-pass placeholder expansion
//! - [`retry`]: fixed-delay retry with timeout and cancellation
//! - [`clients`]: completion / embedding capabilities and bindings
//! - [`scoring`]: vector averaging and cosine similarity
//! - [`orchestration`]: the per-test-case pipeline ([`Evaluator`])
//! - [`domain`]: test cases, prompts, summaries, error types

pub mod clients;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod orchestration;
pub mod retry;
pub mod scoring;
pub mod telemetry;
pub mod template;

pub use clients::openai::{OpenAiClient, OpenAiConfig};
pub use clients::{CompletionClient, Embedding, EmbeddingClient, ServiceError};
pub use config::{ConfigError, EvalConfig};
pub use domain::{
    load_test_cases, parse_test_cases, Bio, Context, EmbeddingTarget, EvaluationError,
    FixtureError, PreconditionError, PromptCandidate, RunSummary, TestCase,
};
pub use orchestration::{EvaluationReceipt, Evaluator};
pub use retry::{run_with_retry, AttemptFailure, RetryError, RetryExecutor, RetryPolicy};
pub use scoring::{average_of_vectors, cosine_similarity, score_embeddings, ScoringError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
