//! Error types for prompt-eval-state

use thiserror::Error;

use crate::storage_traits::ResultStatus;

/// Errors raised while connecting to or initialising the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// A required setting is missing because another one is present
    #[error("{name} must be set when {required_by} is set")]
    MissingSetting {
        name: &'static str,
        required_by: &'static str,
    },

    /// A setting has a value that cannot be interpreted
    #[error("{name}={value:?} is not a valid value")]
    InvalidSetting { name: &'static str, value: String },
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the [`ResultStore`](crate::ResultStore) and
/// [`RunRegistry`](crate::RunRegistry) contracts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// No result record exists for the (run, test case) key
    #[error("no result for test case {test_case_id} in run {run_id}")]
    RecordNotFound {
        run_id: String,
        test_case_id: String,
    },

    /// Run not found
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// The requested status write is not a legal transition
    #[error("invalid status transition for test case {test_case_id}: {from} -> {to}")]
    InvalidTransition {
        test_case_id: String,
        from: ResultStatus,
        to: ResultStatus,
    },

    /// DONE can only be written together with a score and completions
    #[error("status DONE must be written through save_result")]
    ResultRequired,

    /// Score outside [-1, 1] or non-finite
    #[error("score {score} is outside [-1, 1]")]
    ScoreOutOfRange { score: f64 },

    /// Backend failure (query, connection, lock poisoning)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
