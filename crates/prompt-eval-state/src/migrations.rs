//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with their indexes. Safe to call on every connection.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all prompt-eval tables in SurrealDB
///
/// Called on every connection. Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing prompt-eval SurrealDB schema");

    init_prompt_runs_table(db).await?;
    init_test_results_table(db).await?;

    info!("prompt-eval schema initialization complete");
    Ok(())
}

/// Initialize `prompt_runs` table
///
/// Schema:
/// ```text
/// TABLE prompt_runs {
///   run_id:            STRING (unique)
///   prompt_id:         STRING?
///   llm_model:         STRING
///   embeddings_model:  STRING
///   temperature:       FLOAT
///   max_tokens:        INT
///   created_at:        DATETIME (indexed)
/// }
/// ```
///
/// Runs are created by the caller and never deleted.
async fn init_prompt_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing prompt_runs table");

    let sql = r#"
        DEFINE TABLE prompt_runs AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_run_id ON TABLE prompt_runs COLUMNS run_id UNIQUE;
        DEFINE INDEX idx_prompt_id ON TABLE prompt_runs COLUMNS prompt_id;
        DEFINE INDEX idx_created_at ON TABLE prompt_runs COLUMNS created_at;
    "#;

    db.query(sql).await?;
    info!("✓ prompt_runs table initialized");
    Ok(())
}

/// Initialize `test_results` table
///
/// Schema:
/// ```text
/// TABLE test_results {
///   run_id:                   STRING
///   test_case_id:             STRING
///   status:                   STRING (IN_PROGRESS | DONE | ERROR)
///   error_message:            STRING? (iff ERROR)
///   cosine_similarity_score:  FLOAT?  (iff DONE, within [-1, 1])
///   llm_completions:          ARRAY?  (iff DONE)
///   updated_at:               DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(run_id, test_case_id)` is unique
/// - transitions IN_PROGRESS → DONE | ERROR are enforced in the store
async fn init_test_results_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing test_results table");

    let sql = r#"
        DEFINE TABLE test_results AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_run_case ON TABLE test_results COLUMNS run_id, test_case_id UNIQUE;
        DEFINE INDEX idx_run_id ON TABLE test_results COLUMNS run_id;
        DEFINE INDEX idx_run_status ON TABLE test_results COLUMNS run_id, status;
    "#;

    db.query(sql).await?;
    info!("✓ test_results table initialized");
    Ok(())
}
