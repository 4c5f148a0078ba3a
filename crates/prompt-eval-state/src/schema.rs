//! Schema definitions for prompt-eval SurrealDB tables
//!
//! Tables:
//! - prompt_runs: one row per run (generation parameters)
//! - test_results: one row per (run, test case) status record
//!
//! Rows store plain strings; conversion to the `storage_traits` types
//! happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    PromptTestResults, ResultStatus, RunId, RunParams, TestCaseId, TestResultRecord,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Record key for a (run, test case) pair in `test_results`.
pub fn result_key(run_id: &RunId, test_case_id: &TestCaseId) -> String {
    format!("{}/{}", run_id.as_str(), test_case_id.as_str())
}

/// Row in the `prompt_runs` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub prompt_id: Option<String>,
    pub llm_model: String,
    pub embeddings_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl RunRow {
    pub fn new(run_id: &RunId, params: &RunParams) -> Self {
        RunRow {
            id: None,
            run_id: run_id.as_str().to_string(),
            prompt_id: params.prompt_id.clone(),
            llm_model: params.llm_model.clone(),
            embeddings_model: params.embeddings_model.clone(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            created_at: Utc::now(),
        }
    }

    pub fn into_run(self) -> PromptTestResults {
        PromptTestResults {
            id: Some(RunId(self.run_id)),
            params: RunParams {
                prompt_id: self.prompt_id,
                llm_model: self.llm_model,
                embeddings_model: self.embeddings_model,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            created_at: self.created_at,
            test_results: Default::default(),
        }
    }
}

/// Row in the `test_results` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub test_case_id: String,
    /// "IN_PROGRESS" | "DONE" | "ERROR"
    pub status: String,
    pub error_message: Option<String>,
    pub cosine_similarity_score: Option<f64>,
    pub llm_completions: Option<Vec<String>>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&TestResultRecord> for ResultRow {
    fn from(record: &TestResultRecord) -> Self {
        ResultRow {
            id: None,
            run_id: record.run_id.as_str().to_string(),
            test_case_id: record.test_case_id.as_str().to_string(),
            status: record.status.as_str().to_string(),
            error_message: record.error_message.clone(),
            cosine_similarity_score: record.cosine_similarity_score,
            llm_completions: record.llm_completions.clone(),
            updated_at: record.updated_at,
        }
    }
}

impl TryFrom<ResultRow> for TestResultRecord {
    type Error = StorageError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let status: ResultStatus = row.status.parse()?;
        Ok(TestResultRecord {
            run_id: RunId(row.run_id),
            test_case_id: TestCaseId(row.test_case_id),
            status,
            error_message: row.error_message,
            cosine_similarity_score: row.cosine_similarity_score,
            llm_completions: row.llm_completions,
            updated_at: row.updated_at,
        })
    }
}
