//! Per-test-case evaluation pipeline.
//!
//! For one (test case, prompt, run) triple:
//!
//! 1. record IN_PROGRESS
//! 2. expand the prompt with the test case's fields
//! 3. request completions (retried)
//! 4. embed the completions and the good completions (each retried)
//! 5. average each side and take the cosine similarity
//! 6. record DONE with score and completions, or ERROR with a message
//!
//! Invocations for distinct test cases are independent and may run
//! concurrently against the same store and clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prompt_eval_state::{PromptTestResults, ResultStatus, ResultStore, RunId, TestCaseId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::clients::{CompletionClient, Embedding, EmbeddingClient};
use crate::domain::{
    EmbeddingTarget, EvaluationError, PreconditionError, PromptCandidate, TestCase,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::scoring;

/// Acknowledges that an evaluation was attempted. The outcome itself is
/// only visible through the result store.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReceipt {
    pub run_id: RunId,
    pub test_case_id: TestCaseId,
    /// Whether a terminal status (DONE or ERROR) was persisted
    pub recorded: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct Scored {
    score: f64,
    completions: Vec<String>,
}

/// Runs the evaluation pipeline against injected store and clients.
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn ResultStore>,
    completions: Arc<dyn CompletionClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        completions: Arc<dyn CompletionClient>,
        embeddings: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            store,
            completions,
            embeddings,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a cancellation token; cancelling it ends in-flight
    /// evaluations with ERROR "evaluation cancelled".
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Evaluate one test case for one prompt within a run.
    ///
    /// Fails only when the test case or run has no id, in which case
    /// nothing is written. Every other failure (service, scoring, store)
    /// is recorded or logged and reported through the receipt.
    pub async fn process_test_case(
        &self,
        test_case: &TestCase,
        prompt: &PromptCandidate,
        run: &PromptTestResults,
    ) -> Result<EvaluationReceipt, PreconditionError> {
        let test_case_id = test_case
            .id
            .as_ref()
            .ok_or(PreconditionError::MissingTestCaseId)?;
        let run_id = run.id.as_ref().ok_or(PreconditionError::MissingRunId)?;

        let span = obs::evaluation_span(run_id, test_case_id);
        Ok(self
            .process(run_id, test_case_id, test_case, prompt, run)
            .instrument(span)
            .await)
    }

    async fn process(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        test_case: &TestCase,
        prompt: &PromptCandidate,
        run: &PromptTestResults,
    ) -> EvaluationReceipt {
        let started = Instant::now();
        let mut receipt = EvaluationReceipt {
            run_id: run_id.clone(),
            test_case_id: test_case_id.clone(),
            recorded: false,
            elapsed: Duration::ZERO,
        };

        METRICS.inc_started();
        obs::emit_evaluation_started(run_id, test_case_id, &run.params.llm_model);

        if let Err(err) = self
            .store
            .set_status(run_id, test_case_id, ResultStatus::InProgress, None)
            .await
        {
            obs::emit_status_write_failed(run_id, test_case_id, ResultStatus::InProgress, &err);
            METRICS.inc_errored();
            receipt.elapsed = started.elapsed();
            return receipt;
        }

        let (status, score, recorded) = match self.evaluate(test_case, prompt, run).await {
            Ok(scored) => {
                match self
                    .store
                    .save_result(run_id, test_case_id, scored.score, &scored.completions)
                    .await
                {
                    Ok(()) => (ResultStatus::Done, Some(scored.score), true),
                    Err(err) => {
                        obs::emit_status_write_failed(
                            run_id,
                            test_case_id,
                            ResultStatus::Done,
                            &err,
                        );
                        let message = format!("failed to save result: {err}");
                        let recorded = self.record_error(run_id, test_case_id, &message).await;
                        (ResultStatus::Error, None, recorded)
                    }
                }
            }
            Err(err) => {
                if err.is_cancelled() {
                    METRICS.inc_cancellations();
                }
                let recorded = self
                    .record_error(run_id, test_case_id, &err.to_string())
                    .await;
                (ResultStatus::Error, None, recorded)
            }
        };

        match status {
            ResultStatus::Done => METRICS.inc_done(),
            _ => METRICS.inc_errored(),
        }

        receipt.recorded = recorded;
        receipt.elapsed = started.elapsed();
        obs::emit_evaluation_finished(
            run_id,
            test_case_id,
            status,
            score,
            receipt.elapsed.as_millis() as u64,
        );
        receipt
    }

    async fn record_error(&self, run_id: &RunId, test_case_id: &TestCaseId, message: &str) -> bool {
        match self
            .store
            .set_status(run_id, test_case_id, ResultStatus::Error, Some(message))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                obs::emit_status_write_failed(run_id, test_case_id, ResultStatus::Error, &err);
                false
            }
        }
    }

    async fn evaluate(
        &self,
        test_case: &TestCase,
        prompt: &PromptCandidate,
        run: &PromptTestResults,
    ) -> Result<Scored, EvaluationError> {
        if test_case.good_completions.is_empty() {
            return Err(EvaluationError::NoGoodCompletions);
        }

        let executor = RetryExecutor::new(self.policy.clone(), self.cancel.clone());
        let rendered: Arc<str> = Arc::from(test_case.render(&prompt.prompt));
        let model: Arc<str> = Arc::from(run.params.llm_model.as_str());
        let temperature = run.params.temperature;
        let max_tokens = run.params.max_tokens;

        let completions = executor
            .run("completions", || {
                let client = Arc::clone(&self.completions);
                let rendered = Arc::clone(&rendered);
                let model = Arc::clone(&model);
                async move {
                    client
                        .get_completions(&rendered, &model, temperature, max_tokens)
                        .await
                }
            })
            .await
            .map_err(EvaluationError::completion)?;

        if completions.is_empty() {
            return Err(EvaluationError::NoCompletions);
        }
        debug!(count = completions.len(), "completions received");

        let generated = self
            .embed(
                &executor,
                EmbeddingTarget::Generated,
                &completions,
                &run.params.embeddings_model,
            )
            .await?;
        let reference = self
            .embed(
                &executor,
                EmbeddingTarget::Reference,
                &test_case.good_completions,
                &run.params.embeddings_model,
            )
            .await?;

        let score = scoring::score_embeddings(&generated, &reference)?;
        Ok(Scored { score, completions })
    }

    async fn embed(
        &self,
        executor: &RetryExecutor,
        target: EmbeddingTarget,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Embedding>, EvaluationError> {
        let texts: Arc<[String]> = Arc::from(texts);
        let model: Arc<str> = Arc::from(model);
        let label = match target {
            EmbeddingTarget::Generated => "embeddings.generated",
            EmbeddingTarget::Reference => "embeddings.reference",
        };

        let vectors = executor
            .run(label, || {
                let client = Arc::clone(&self.embeddings);
                let texts = Arc::clone(&texts);
                let model = Arc::clone(&model);
                async move { client.embed(&texts, &model).await }
            })
            .await
            .map_err(|err| EvaluationError::embedding(target, err))?;

        if vectors.len() != texts.len() {
            return Err(EvaluationError::EmbeddingCount {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}
