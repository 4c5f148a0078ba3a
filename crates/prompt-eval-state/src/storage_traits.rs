//! Storage trait definitions for prompt evaluation
//!
//! These traits define the core storage abstractions:
//! - `ResultStore`: per-(run, test case) status and score records
//! - `RunRegistry`: run (`PromptTestResults`) creation and lookup
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Message recorded when an ERROR write carries no message of its own.
pub const UNSPECIFIED_ERROR_MESSAGE: &str = "evaluation failed without a message";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for an evaluation run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a test case fixture
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCaseId(pub String);

impl TestCaseId {
    pub fn new(id: impl Into<String>) -> Self {
        TestCaseId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Status of one test case within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    InProgress,
    Done,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::InProgress => "IN_PROGRESS",
            ResultStatus::Done => "DONE",
            ResultStatus::Error => "ERROR",
        }
    }

    /// DONE and ERROR never change again within one evaluation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Done | ResultStatus::Error)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(ResultStatus::InProgress),
            "DONE" => Ok(ResultStatus::Done),
            "ERROR" => Ok(ResultStatus::Error),
            other => Err(StorageError::Backend(format!(
                "unknown result status: {other}"
            ))),
        }
    }
}

/// Persisted outcome of one test case within a run.
///
/// Invariants:
/// - `error_message` is present iff `status == Error`.
/// - `cosine_similarity_score` and `llm_completions` are present iff
///   `status == Done`, and the score lies in [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    pub run_id: RunId,
    pub test_case_id: TestCaseId,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosine_similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_completions: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

impl TestResultRecord {
    fn in_progress(run_id: &RunId, test_case_id: &TestCaseId) -> Self {
        Self {
            run_id: run_id.clone(),
            test_case_id: test_case_id.clone(),
            status: ResultStatus::InProgress,
            error_message: None,
            cosine_similarity_score: None,
            llm_completions: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply a status write to the current record (if any).
    ///
    /// Returns `Ok(None)` when the write repeats the terminal state already
    /// stored, so backends can skip the write.
    pub fn apply(
        current: Option<&TestResultRecord>,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        write: StatusWrite,
    ) -> StorageResult<Option<TestResultRecord>> {
        let to = write.status();

        let current = match (&write, current) {
            (StatusWrite::Start, _) => {
                return Ok(Some(Self::in_progress(run_id, test_case_id)));
            }
            (_, None) => {
                return Err(StorageError::RecordNotFound {
                    run_id: run_id.to_string(),
                    test_case_id: test_case_id.to_string(),
                });
            }
            (_, Some(current)) => current,
        };

        let mut next = current.clone();
        next.updated_at = Utc::now();
        next.status = to;
        match write {
            StatusWrite::Start => {}
            StatusWrite::Fail { message } => {
                next.error_message = Some(message);
                next.cosine_similarity_score = None;
                next.llm_completions = None;
            }
            StatusWrite::Complete { score, completions } => {
                next.error_message = None;
                next.cosine_similarity_score = Some(validate_score(score)?);
                next.llm_completions = Some(completions);
            }
        }

        if current.status.is_terminal() {
            if current.same_outcome(&next) {
                return Ok(None);
            }
            return Err(StorageError::InvalidTransition {
                test_case_id: test_case_id.to_string(),
                from: current.status,
                to,
            });
        }

        Ok(Some(next))
    }

    fn same_outcome(&self, other: &TestResultRecord) -> bool {
        self.status == other.status
            && self.error_message == other.error_message
            && self.cosine_similarity_score == other.cosine_similarity_score
            && self.llm_completions == other.llm_completions
    }
}

/// A single write against a result record
#[derive(Debug, Clone, PartialEq)]
pub enum StatusWrite {
    /// Begin (or restart) an evaluation: IN_PROGRESS
    Start,
    /// Terminal failure: ERROR with a message
    Fail { message: String },
    /// Terminal success: DONE with score and generated completions
    Complete { score: f64, completions: Vec<String> },
}

impl StatusWrite {
    /// Build the write for a `set_status` call.
    ///
    /// DONE is rejected: it needs a score, see [`ResultStore::save_result`].
    pub fn from_status(status: ResultStatus, message: Option<&str>) -> StorageResult<Self> {
        match status {
            ResultStatus::InProgress => Ok(StatusWrite::Start),
            ResultStatus::Error => Ok(StatusWrite::Fail {
                message: message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(UNSPECIFIED_ERROR_MESSAGE)
                    .to_string(),
            }),
            ResultStatus::Done => Err(StorageError::ResultRequired),
        }
    }

    pub fn status(&self) -> ResultStatus {
        match self {
            StatusWrite::Start => ResultStatus::InProgress,
            StatusWrite::Fail { .. } => ResultStatus::Error,
            StatusWrite::Complete { .. } => ResultStatus::Done,
        }
    }
}

/// Reject non-finite scores and scores outside [-1, 1].
pub fn validate_score(score: f64) -> StorageResult<f64> {
    if score.is_finite() && (-1.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(StorageError::ScoreOutOfRange { score })
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Generation parameters shared by every test case in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParams {
    /// Prompt candidate evaluated by this run
    #[serde(default)]
    pub prompt_id: Option<String>,
    pub llm_model: String,
    pub embeddings_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A run: one prompt candidate evaluated across many test cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTestResults {
    /// Absent until the run has been registered
    #[serde(default)]
    pub id: Option<RunId>,
    #[serde(flatten)]
    pub params: RunParams,
    pub created_at: DateTime<Utc>,
    /// Keyed by test case id
    #[serde(default)]
    pub test_results: BTreeMap<TestCaseId, TestResultRecord>,
}

impl PromptTestResults {
    /// An unregistered run carrying only its parameters.
    pub fn unregistered(params: RunParams) -> Self {
        Self {
            id: None,
            params,
            created_at: Utc::now(),
            test_results: BTreeMap::new(),
        }
    }

    pub fn with_results(mut self, results: Vec<TestResultRecord>) -> Self {
        self.test_results = results
            .into_iter()
            .map(|r| (r.test_case_id.clone(), r))
            .collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Durable per-(run, test case) status store.
///
/// Guarantees:
/// - A write has been persisted when the call returns `Ok`.
/// - IN_PROGRESS may always be written; it starts a new evaluation.
/// - ERROR / DONE are only written from IN_PROGRESS; repeating the exact
///   terminal write is a no-op, anything else is `InvalidTransition`.
/// - A DONE record's score lies in [-1, 1].
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write IN_PROGRESS or ERROR (with message) for a test case.
    async fn set_status(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        status: ResultStatus,
        message: Option<&str>,
    ) -> StorageResult<()>;

    /// Write DONE with the similarity score and generated completions.
    async fn save_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        score: f64,
        completions: &[String],
    ) -> StorageResult<()>;

    /// Fetch one record. Returns `RecordNotFound` if absent.
    async fn get_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
    ) -> StorageResult<TestResultRecord>;

    /// All records of a run, ordered by test case id.
    async fn list_results(&self, run_id: &RunId) -> StorageResult<Vec<TestResultRecord>>;
}

/// Registry of evaluation runs. Runs are never deleted.
#[async_trait]
pub trait RunRegistry: Send + Sync {
    /// Register a new run with a generated id.
    async fn create_run(&self, params: RunParams) -> StorageResult<PromptTestResults>;

    /// Fetch a run together with its result records.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<PromptTestResults>;

    /// List runs, newest first (result maps left empty).
    async fn list_runs(&self) -> StorageResult<Vec<PromptTestResults>>;
}
