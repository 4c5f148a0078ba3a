//! prompt-eval-state: SurrealDB Backend for Prompt Evaluation
//!
//! This crate provides the persistence layer for prompt evaluation runs.
//! It owns the per-(run, test case) status records written while a test
//! case is evaluated, and the run records that group them.
//!
//! ## Key Components
//!
//! - `ResultStore`: status transitions and final-result save
//! - `RunRegistry`: run creation and lookup
//! - `SurrealResultStore`: SurrealDB implementation of both traits
//! - `fakes::MemoryResultStore`: in-memory implementation for tests

pub mod config;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use config::{AuthLevel, RemoteConfig, StoreTarget};
pub use error::{StateError, StorageError};
pub use schema::{ResultRow, RunRow};
pub use storage_traits::{
    validate_score, PromptTestResults, ResultStatus, ResultStore, RunId, RunParams, RunRegistry,
    StatusWrite, StorageResult, TestCaseId, TestResultRecord, UNSPECIFIED_ERROR_MESSAGE,
};
pub use surreal_store::SurrealResultStore;

/// Result type for prompt-eval-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
