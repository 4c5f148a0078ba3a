use std::path::{Path, PathBuf};

use prompt_eval_state::TestCaseId;
use thiserror::Error;

use crate::clients::ServiceError;
use crate::retry::RetryError;
use crate::scoring::ScoringError;

/// Input that makes an evaluation impossible to start.
///
/// Returned before anything is written to the result store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("test case has no id")]
    MissingTestCaseId,

    #[error("test run has no id")]
    MissingRunId,
}

/// Which side of the comparison an embedding request served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTarget {
    Generated,
    Reference,
}

impl std::fmt::Display for EmbeddingTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EmbeddingTarget::Generated => "generated completions",
            EmbeddingTarget::Reference => "good completions",
        })
    }
}

/// Why an evaluation ended in ERROR. The display text is what gets
/// recorded as the result's error message.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("completion request {0}")]
    Completion(#[source] RetryError<ServiceError>),

    #[error("embedding request for {target} {source}")]
    Embedding {
        target: EmbeddingTarget,
        source: RetryError<ServiceError>,
    },

    #[error("completion service returned no completions")]
    NoCompletions,

    #[error("test case has no good completions")]
    NoGoodCompletions,

    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvaluationError {
    pub(crate) fn completion(err: RetryError<ServiceError>) -> Self {
        if err.is_cancelled() {
            return EvaluationError::Cancelled;
        }
        EvaluationError::Completion(err)
    }

    pub(crate) fn embedding(target: EmbeddingTarget, err: RetryError<ServiceError>) -> Self {
        if err.is_cancelled() {
            return EvaluationError::Cancelled;
        }
        EvaluationError::Embedding {
            target,
            source: err,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EvaluationError::Cancelled)
    }
}

/// Failure loading a fixture file.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid fixture JSON{}: {source}", display_path(path))]
    Parse {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },

    #[error("fixture file{} contains no test cases", display_path(path))]
    Empty { path: Option<PathBuf> },

    #[error("test case at index {index} has no good completions")]
    NoGoodCompletions { index: usize },

    #[error("test case at index {index} reuses id {id}")]
    DuplicateId { id: TestCaseId, index: usize },
}

impl FixtureError {
    pub(crate) fn at(self, file: &Path) -> Self {
        match self {
            FixtureError::Parse { source, .. } => FixtureError::Parse {
                path: Some(file.to_path_buf()),
                source,
            },
            FixtureError::Empty { .. } => FixtureError::Empty {
                path: Some(file.to_path_buf()),
            },
            other => other,
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::AttemptFailure;

    #[test]
    fn cancelled_retry_maps_to_cancelled() {
        let err = EvaluationError::completion(RetryError::Cancelled { attempts: 2 });
        assert_eq!(err.to_string(), "evaluation cancelled");
    }

    #[test]
    fn exhausted_completion_message() {
        let err = EvaluationError::completion(RetryError::Exhausted {
            attempts: 4,
            last: AttemptFailure::Failed(ServiceError::Unavailable("quota".into())),
        });
        assert_eq!(
            err.to_string(),
            "completion request failed after 4 attempt(s): service unavailable: quota"
        );
    }

    #[test]
    fn embedding_message_names_target() {
        let err = EvaluationError::embedding(
            EmbeddingTarget::Reference,
            RetryError::Exhausted {
                attempts: 1,
                last: AttemptFailure::TimedOut(std::time::Duration::from_secs(60)),
            },
        );
        assert!(err.to_string().starts_with("embedding request for good completions failed"));
    }
}
