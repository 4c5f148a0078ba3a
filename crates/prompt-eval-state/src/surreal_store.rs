//! SurrealDB-backed ResultStore and RunRegistry implementation
//!
//! Uses `schema::RunRow` and `schema::ResultRow` for persistence,
//! converting to/from `storage_traits` types at the boundary. Result rows
//! are addressed by a deterministic record id per (run, test case), so a
//! status write is a single upsert.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::{AuthLevel, RemoteConfig, StoreTarget, DEFAULT_DATABASE, DEFAULT_NAMESPACE};
use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{result_key, ResultRow, RunRow};
use crate::storage_traits::{
    PromptTestResults, ResultStatus, ResultStore, RunId, RunParams, RunRegistry, StatusWrite,
    StorageResult, TestCaseId, TestResultRecord,
};

const RUNS_TABLE: &str = "prompt_runs";
const RESULTS_TABLE: &str = "test_results";

/// SurrealDB-backed implementation of [`ResultStore`] and [`RunRegistry`].
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct SurrealResultStore {
    db: Surreal<Any>,
}

impl SurrealResultStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `prompt_eval/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect_url("mem://").await
    }

    /// Connect to any SurrealDB URL (`mem://`, `surrealkv://path`, `ws://host`).
    #[instrument]
    pub async fn connect_url(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealResultStore connected ({})", url);
        Ok(Self { db })
    }

    /// Connect to a remote server with credentials.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect_remote(config: RemoteConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        match config.auth {
            AuthLevel::Root => db
                .signin(Root {
                    username: &config.username,
                    password: &config.password,
                })
                .await
                .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?,
            AuthLevel::Database => db
                .signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &config.username,
                    password: &config.password,
                })
                .await
                .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?,
        };

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealResultStore connected (remote)");
        Ok(Self { db })
    }

    /// Connect to a resolved [`StoreTarget`], creating the local directory
    /// when needed.
    pub async fn connect(target: StoreTarget) -> crate::Result<Self> {
        match target {
            StoreTarget::Remote(config) => Self::connect_remote(config).await,
            StoreTarget::Url(url) => Self::connect_url(&url).await,
            StoreTarget::Local(path) => {
                std::fs::create_dir_all(&path).map_err(|e| {
                    StateError::Connection(format!(
                        "Failed to create database directory {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let url = format!("surrealkv://{}", path.display());
                info!("No remote store configured, using local persistence: {}", url);
                Self::connect_url(&url).await
            }
        }
    }

    /// Resolve the target from `SURREALDB_*` variables (see
    /// [`StoreTarget::from_lookup`]) and connect.
    ///
    /// Incomplete remote credentials fail here instead of falling back to
    /// local storage.
    pub async fn from_env() -> crate::Result<Self> {
        Self::connect(StoreTarget::from_env()?).await
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
    ) -> StorageResult<Option<TestResultRecord>> {
        let row: Option<ResultRow> = self
            .db
            .select((RESULTS_TABLE, result_key(run_id, test_case_id)))
            .await?;
        row.map(TestResultRecord::try_from).transpose()
    }

    async fn write(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        write: StatusWrite,
    ) -> StorageResult<()> {
        let current = self.fetch_result(run_id, test_case_id).await?;
        let Some(next) = TestResultRecord::apply(current.as_ref(), run_id, test_case_id, write)?
        else {
            debug!(%run_id, %test_case_id, "terminal write repeated, skipping");
            return Ok(());
        };

        debug!(%run_id, %test_case_id, status = %next.status, "writing result status");

        let _written: Option<ResultRow> = self
            .db
            .upsert((RESULTS_TABLE, result_key(run_id, test_case_id)))
            .content(ResultRow::from(&next))
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ResultStore for SurrealResultStore {
    async fn set_status(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        status: ResultStatus,
        message: Option<&str>,
    ) -> StorageResult<()> {
        let write = StatusWrite::from_status(status, message)?;
        self.write(run_id, test_case_id, write).await
    }

    async fn save_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        score: f64,
        completions: &[String],
    ) -> StorageResult<()> {
        self.write(
            run_id,
            test_case_id,
            StatusWrite::Complete {
                score,
                completions: completions.to_vec(),
            },
        )
        .await
    }

    async fn get_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
    ) -> StorageResult<TestResultRecord> {
        self.fetch_result(run_id, test_case_id)
            .await?
            .ok_or_else(|| StorageError::RecordNotFound {
                run_id: run_id.to_string(),
                test_case_id: test_case_id.to_string(),
            })
    }

    async fn list_results(&self, run_id: &RunId) -> StorageResult<Vec<TestResultRecord>> {
        let rid_owned = run_id.as_str().to_string();
        let mut res = self
            .db
            .query(format!(
                "SELECT * FROM {RESULTS_TABLE} WHERE run_id = $rid ORDER BY test_case_id ASC"
            ))
            .bind(("rid", rid_owned))
            .await?;

        let rows: Vec<ResultRow> = res.take(0)?;
        rows.into_iter().map(TestResultRecord::try_from).collect()
    }
}

#[async_trait]
impl RunRegistry for SurrealResultStore {
    async fn create_run(&self, params: RunParams) -> StorageResult<PromptTestResults> {
        let run_id = RunId::new();
        let row = RunRow::new(&run_id, &params);

        debug!(run_id = %run_id, "creating run");

        let created: Option<RunRow> = self
            .db
            .create((RUNS_TABLE, run_id.as_str()))
            .content(row)
            .await?;

        created
            .map(RunRow::into_run)
            .ok_or_else(|| StorageError::Backend(format!("failed to create run {run_id}")))
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<PromptTestResults> {
        let row: Option<RunRow> = self.db.select((RUNS_TABLE, run_id.as_str())).await?;
        let run = row.ok_or_else(|| StorageError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        let results = self.list_results(run_id).await?;
        Ok(run.into_run().with_results(results))
    }

    async fn list_runs(&self) -> StorageResult<Vec<PromptTestResults>> {
        let mut res = self
            .db
            .query(format!(
                "SELECT * FROM {RUNS_TABLE} ORDER BY created_at DESC"
            ))
            .await?;
        let rows: Vec<RunRow> = res.take(0)?;
        Ok(rows.into_iter().map(RunRow::into_run).collect())
    }
}
