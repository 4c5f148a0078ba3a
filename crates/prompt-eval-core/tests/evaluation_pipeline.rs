//! End-to-end behaviour of `Evaluator::process_test_case` against the
//! in-memory store and scripted clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prompt_eval_core::clients::fakes::{FakeCompletionClient, FakeEmbeddingClient};
use prompt_eval_core::{
    Bio, Context, Evaluator, PreconditionError, PromptCandidate, RetryPolicy, TestCase,
};
use prompt_eval_state::fakes::MemoryResultStore;
use prompt_eval_state::{
    PromptTestResults, ResultStatus, ResultStore, RunId, RunParams, RunRegistry, StorageError,
    StorageResult, SurrealResultStore, TestCaseId, TestResultRecord,
};
use tokio_util::sync::CancellationToken;

const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

fn params() -> RunParams {
    RunParams {
        prompt_id: Some("greeting-v1".to_string()),
        llm_model: "gpt-4o-mini".to_string(),
        embeddings_model: "text-embedding-3-small".to_string(),
        temperature: 0.7,
        max_tokens: 64,
    }
}

fn registered_run() -> PromptTestResults {
    let mut run = PromptTestResults::unregistered(params());
    run.id = Some(RunId::new());
    run
}

fn test_case(id: &str, good: &[&str]) -> TestCase {
    TestCase {
        id: Some(TestCaseId::new(id)),
        bio: Bio {
            name: "Sam".to_string(),
            age: 30,
            about_me: "Rock climber".to_string(),
        },
        context: Context {
            tone: "friendly".to_string(),
            setting: "gym".to_string(),
            conversation_type: "small talk".to_string(),
        },
        utterance: "Hey!".to_string(),
        good_completions: good.iter().map(|s| s.to_string()).collect(),
    }
}

fn prompt() -> PromptCandidate {
    PromptCandidate::new("Hi {name}, age {age}").with_id("greeting-v1")
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_secs(5))
}

struct Harness {
    store: Arc<MemoryResultStore>,
    completions: Arc<FakeCompletionClient>,
    embeddings: Arc<FakeEmbeddingClient>,
    evaluator: Evaluator,
}

fn harness(completions: FakeCompletionClient, embeddings: FakeEmbeddingClient) -> Harness {
    let store = Arc::new(MemoryResultStore::new());
    let completions = Arc::new(completions);
    let embeddings = Arc::new(embeddings);
    let evaluator = Evaluator::new(store.clone(), completions.clone(), embeddings.clone())
        .with_retry_policy(fast_policy());
    Harness {
        store,
        completions,
        embeddings,
        evaluator,
    }
}

async fn record(store: &MemoryResultStore, run: &PromptTestResults, id: &str) -> TestResultRecord {
    store
        .get_result(run.id.as_ref().unwrap(), &TestCaseId::new(id))
        .await
        .unwrap()
}

// ===========================================================================
// DONE path
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn done_records_score_and_completions() {
    let h = harness(
        FakeCompletionClient::replying(["Hello Sam"]),
        FakeEmbeddingClient::new(vec![1.0, 0.0]).with_vector("Hello Sam", vec![1.0, 1.0]),
    );
    let run = registered_run();
    let case = test_case("tc-1", &["Hi there"]);

    let receipt = h
        .evaluator
        .process_test_case(&case, &prompt(), &run)
        .await
        .unwrap();

    assert!(receipt.recorded);

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Done);
    assert!((rec.cosine_similarity_score.unwrap() - FRAC_1_SQRT_2).abs() < 1e-9);
    assert_eq!(rec.llm_completions, Some(vec!["Hello Sam".to_string()]));
    assert!(rec.error_message.is_none());

    assert_eq!(
        h.store.writes_for(&TestCaseId::new("tc-1")),
        vec![ResultStatus::InProgress, ResultStatus::Done]
    );
}

#[tokio::test(start_paused = true)]
async fn completion_request_uses_expanded_prompt_and_run_params() {
    let h = harness(
        FakeCompletionClient::replying(["ok"]),
        FakeEmbeddingClient::new(vec![1.0, 0.0]),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["fine"]), &prompt(), &run)
        .await
        .unwrap();

    let requests = h.completions.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "Hi Sam, age 30");
    assert_eq!(requests[0].model, "gpt-4o-mini");
    assert_eq!(requests[0].temperature, 0.7);
    assert_eq!(requests[0].max_tokens, 64);

    // One batch for the generated side, one for the reference side
    assert_eq!(
        h.embeddings.batches(),
        vec![vec!["ok".to_string()], vec!["fine".to_string()]]
    );
}

#[tokio::test(start_paused = true)]
async fn transient_completion_failures_are_retried() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]).fail_first(2, "rate limited"),
        FakeEmbeddingClient::new(vec![1.0, 0.0]),
    );
    let run = registered_run();
    let started = tokio::time::Instant::now();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    assert_eq!(h.completions.calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(record(&h.store, &run, "tc-1").await.status, ResultStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn identical_embeddings_score_one() {
    let h = harness(
        FakeCompletionClient::replying(["same", "same"]),
        FakeEmbeddingClient::new(vec![0.3, -0.7, 2.5]),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["same"]), &prompt(), &run)
        .await
        .unwrap();

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Done);
    assert!((rec.cosine_similarity_score.unwrap() - 1.0).abs() < 1e-9);
}

// ===========================================================================
// ERROR paths
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn exhausted_completions_record_error() {
    let h = harness(
        FakeCompletionClient::failing("quota exceeded"),
        FakeEmbeddingClient::new(vec![1.0]),
    );
    let run = registered_run();

    let receipt = h
        .evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    assert!(receipt.recorded);
    assert_eq!(h.completions.calls(), 4);
    assert_eq!(h.embeddings.calls(), 0);

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    assert!(rec.error_message.unwrap().contains("quota exceeded"));
    assert!(rec.cosine_similarity_score.is_none());
    assert_eq!(
        h.store.writes_for(&TestCaseId::new("tc-1")),
        vec![ResultStatus::InProgress, ResultStatus::Error]
    );
}

#[tokio::test(start_paused = true)]
async fn embedding_failure_records_error() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]),
        FakeEmbeddingClient::failing("embeddings down"),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    let message = rec.error_message.unwrap();
    assert!(message.contains("generated completions"), "{message}");
    assert!(message.contains("embeddings down"), "{message}");
    assert_eq!(h.embeddings.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn zero_vector_records_error() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]),
        FakeEmbeddingClient::new(vec![0.0, 0.0]),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    assert!(rec.error_message.unwrap().contains("zero magnitude"));
}

#[tokio::test(start_paused = true)]
async fn non_finite_embeddings_record_error() {
    for vector in [vec![f64::NAN, 1.0], vec![f64::INFINITY, 1.0]] {
        let h = harness(
            FakeCompletionClient::replying(["Hello"]),
            FakeEmbeddingClient::new(vector.clone()),
        );
        let run = registered_run();

        h.evaluator
            .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
            .await
            .unwrap();

        let rec = record(&h.store, &run, "tc-1").await;
        assert_eq!(rec.status, ResultStatus::Error, "{vector:?}");
        assert!(rec.cosine_similarity_score.is_none());
        assert!(rec.error_message.unwrap().contains("outside [-1, 1]"));
        assert_eq!(
            h.store.writes_for(&TestCaseId::new("tc-1")),
            vec![ResultStatus::InProgress, ResultStatus::Error]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn extreme_magnitude_embeddings_score_one() {
    for vector in [vec![1e200, 1e200], vec![1e-200, 1e-200]] {
        let h = harness(
            FakeCompletionClient::replying(["Hello"]),
            FakeEmbeddingClient::new(vector.clone()),
        );
        let run = registered_run();

        h.evaluator
            .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
            .await
            .unwrap();

        let rec = record(&h.store, &run, "tc-1").await;
        assert_eq!(rec.status, ResultStatus::Done, "{vector:?}");
        assert!((rec.cosine_similarity_score.unwrap() - 1.0).abs() < 1e-9);
    }
}

#[tokio::test(start_paused = true)]
async fn mismatched_dimensions_record_error() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]),
        FakeEmbeddingClient::new(vec![1.0, 0.0]).with_vector("Hi", vec![1.0, 0.0, 0.0]),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    assert!(rec.error_message.unwrap().contains("dimension mismatch"));
}

#[tokio::test(start_paused = true)]
async fn empty_completions_record_error() {
    let h = harness(
        FakeCompletionClient::replying(Vec::<String>::new()),
        FakeEmbeddingClient::new(vec![1.0]),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(
        rec.error_message.as_deref(),
        Some("completion service returned no completions")
    );
    assert_eq!(h.embeddings.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_good_completions_records_error_without_calls() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]),
        FakeEmbeddingClient::new(vec![1.0]),
    );
    let run = registered_run();

    h.evaluator
        .process_test_case(&test_case("tc-1", &[]), &prompt(), &run)
        .await
        .unwrap();

    let rec = record(&h.store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    assert_eq!(h.completions.calls(), 0);
    assert_eq!(h.embeddings.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_attempts_time_out() {
    let store = Arc::new(MemoryResultStore::new());
    let completions = Arc::new(FakeCompletionClient::hanging());
    let evaluator = Evaluator::new(
        store.clone(),
        completions.clone(),
        Arc::new(FakeEmbeddingClient::new(vec![1.0])),
    )
    .with_retry_policy(
        RetryPolicy::new(2, Duration::from_secs(1)).with_attempt_timeout(Duration::from_secs(60)),
    );
    let run = registered_run();

    evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    assert_eq!(completions.calls(), 2);
    let rec = record(&store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    assert!(rec.error_message.unwrap().contains("timed out"));
}

// ===========================================================================
// Cancellation
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn cancellation_records_error() {
    let store = Arc::new(MemoryResultStore::new());
    let token = CancellationToken::new();
    let evaluator = Evaluator::new(
        store.clone(),
        Arc::new(FakeCompletionClient::hanging()),
        Arc::new(FakeEmbeddingClient::new(vec![1.0])),
    )
    .with_cancellation(token.clone());
    let run = registered_run();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
    });

    let receipt = evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert!(receipt.recorded);
    let rec = record(&store, &run, "tc-1").await;
    assert_eq!(rec.status, ResultStatus::Error);
    assert_eq!(rec.error_message.as_deref(), Some("evaluation cancelled"));
}

// ===========================================================================
// Preconditions
// ===========================================================================

#[tokio::test]
async fn missing_test_case_id_writes_nothing() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]),
        FakeEmbeddingClient::new(vec![1.0]),
    );
    let mut case = test_case("tc-1", &["Hi"]);
    case.id = None;

    let err = h
        .evaluator
        .process_test_case(&case, &prompt(), &registered_run())
        .await
        .unwrap_err();

    assert_eq!(err, PreconditionError::MissingTestCaseId);
    assert!(h.store.writes().is_empty());
    assert_eq!(h.completions.calls(), 0);
}

#[tokio::test]
async fn missing_run_id_writes_nothing() {
    let h = harness(
        FakeCompletionClient::replying(["Hello"]),
        FakeEmbeddingClient::new(vec![1.0]),
    );
    let run = PromptTestResults::unregistered(params());

    let err = h
        .evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap_err();

    assert_eq!(err, PreconditionError::MissingRunId);
    assert!(h.store.writes().is_empty());
}

// ===========================================================================
// Store failures
// ===========================================================================

/// Store whose every write fails.
struct UnavailableStore;

#[async_trait]
impl ResultStore for UnavailableStore {
    async fn set_status(
        &self,
        _run_id: &RunId,
        _test_case_id: &TestCaseId,
        _status: ResultStatus,
        _message: Option<&str>,
    ) -> StorageResult<()> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn save_result(
        &self,
        _run_id: &RunId,
        _test_case_id: &TestCaseId,
        _score: f64,
        _completions: &[String],
    ) -> StorageResult<()> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn get_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
    ) -> StorageResult<TestResultRecord> {
        Err(StorageError::RecordNotFound {
            run_id: run_id.to_string(),
            test_case_id: test_case_id.to_string(),
        })
    }

    async fn list_results(&self, _run_id: &RunId) -> StorageResult<Vec<TestResultRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_in_progress_write_skips_service_calls() {
    let completions = Arc::new(FakeCompletionClient::replying(["Hello"]));
    let evaluator = Evaluator::new(
        Arc::new(UnavailableStore),
        completions.clone(),
        Arc::new(FakeEmbeddingClient::new(vec![1.0])),
    );

    let receipt = evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &registered_run())
        .await
        .unwrap();

    assert!(!receipt.recorded);
    assert_eq!(completions.calls(), 0);
}

// ===========================================================================
// Concurrency and persistence
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_cases_keep_their_own_results() {
    let store = Arc::new(MemoryResultStore::new());
    let evaluator = Evaluator::new(
        store.clone(),
        Arc::new(FakeCompletionClient::replying(["gen"])),
        Arc::new(
            FakeEmbeddingClient::new(vec![1.0, 1.0])
                .with_vector("gen", vec![1.0, 0.0])
                .with_vector("ref-a", vec![1.0, 0.0])
                .with_vector("ref-b", vec![0.0, 1.0])
                .with_latency(Duration::from_millis(10)),
        ),
    )
    .with_retry_policy(RetryPolicy::new(1, Duration::ZERO));
    let run = registered_run();

    let handles: Vec<_> = [("a", "ref-a"), ("b", "ref-b")]
        .into_iter()
        .map(|(id, reference)| {
            let evaluator = evaluator.clone();
            let run = run.clone();
            let case = test_case(id, &[reference]);
            tokio::spawn(async move { evaluator.process_test_case(&case, &prompt(), &run).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap().unwrap().recorded);
    }

    let a = record(&store, &run, "a").await;
    let b = record(&store, &run, "b").await;
    assert!((a.cosine_similarity_score.unwrap() - 1.0).abs() < 1e-9);
    assert!(b.cosine_similarity_score.unwrap().abs() < 1e-9);
    assert_eq!(
        store.writes_for(&TestCaseId::new("a")),
        vec![ResultStatus::InProgress, ResultStatus::Done]
    );
    assert_eq!(
        store.writes_for(&TestCaseId::new("b")),
        vec![ResultStatus::InProgress, ResultStatus::Done]
    );
}

#[tokio::test]
async fn evaluates_against_surreal_store() {
    let store = Arc::new(SurrealResultStore::in_memory().await.unwrap());
    let run = store.create_run(params()).await.unwrap();
    let evaluator = Evaluator::new(
        store.clone(),
        Arc::new(FakeCompletionClient::replying(["Hello Sam"])),
        Arc::new(FakeEmbeddingClient::new(vec![0.6, 0.8])),
    )
    .with_retry_policy(RetryPolicy::new(1, Duration::ZERO));

    evaluator
        .process_test_case(&test_case("tc-1", &["Hi"]), &prompt(), &run)
        .await
        .unwrap();

    let fetched = store.get_run(run.id.as_ref().unwrap()).await.unwrap();
    let rec = &fetched.test_results[&TestCaseId::new("tc-1")];
    assert_eq!(rec.status, ResultStatus::Done);
    assert!((rec.cosine_similarity_score.unwrap() - 1.0).abs() < 1e-9);
}
