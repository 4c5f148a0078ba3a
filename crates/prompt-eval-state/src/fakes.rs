//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryResultStore`, which satisfies both the `ResultStore` and
//! `RunRegistry` contracts without any external dependencies. It also keeps
//! a write log so tests can assert on the exact sequence of status writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

/// One accepted write, as observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub run_id: RunId,
    pub test_case_id: TestCaseId,
    pub status: ResultStatus,
}

#[derive(Debug, Default)]
struct Inner {
    runs: HashMap<RunId, PromptTestResults>,
    results: BTreeMap<(RunId, TestCaseId), TestResultRecord>,
    writes: Vec<RecordedWrite>,
}

/// In-memory result store and run registry backed by `BTreeMap`s.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    inner: Mutex<Inner>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    /// Every accepted status write, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().map(|inner| inner.writes.clone()).unwrap_or_default()
    }

    /// Accepted writes for one test case, in order.
    pub fn writes_for(&self, test_case_id: &TestCaseId) -> Vec<ResultStatus> {
        self.writes()
            .into_iter()
            .filter(|w| &w.test_case_id == test_case_id)
            .map(|w| w.status)
            .collect()
    }

    fn write(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        write: StatusWrite,
    ) -> StorageResult<()> {
        let mut inner = self.lock()?;
        let key = (run_id.clone(), test_case_id.clone());
        let next = TestResultRecord::apply(inner.results.get(&key), run_id, test_case_id, write)?;
        if let Some(next) = next {
            inner.writes.push(RecordedWrite {
                run_id: run_id.clone(),
                test_case_id: test_case_id.clone(),
                status: next.status,
            });
            inner.results.insert(key, next);
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn set_status(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
        status: ResultStatus,
        message: Option<&str>,
    ) -> StorageResult<()> {
        let write = StatusWrite::from_status(status, message)?;
        self.write(run_id, test_case_id, write)
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
    }

    async fn get_result(
        &self,
        run_id: &RunId,
        test_case_id: &TestCaseId,
    ) -> StorageResult<TestResultRecord> {
        let inner = self.lock()?;
        inner
            .results
            .get(&(run_id.clone(), test_case_id.clone()))
            .cloned()
            .ok_or_else(|| StorageError::RecordNotFound {
                run_id: run_id.to_string(),
                test_case_id: test_case_id.to_string(),
            })
    }

    async fn list_results(&self, run_id: &RunId) -> StorageResult<Vec<TestResultRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .results
            .iter()
            .filter(|((rid, _), _)| rid == run_id)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[async_trait]
impl RunRegistry for MemoryResultStore {
    async fn create_run(&self, params: RunParams) -> StorageResult<PromptTestResults> {
        let run_id = RunId::new();
        let run = PromptTestResults {
            id: Some(run_id.clone()),
            params,
            created_at: Utc::now(),
            test_results: BTreeMap::new(),
        };
        let mut inner = self.lock()?;
        inner.runs.insert(run_id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<PromptTestResults> {
        let run = {
            let inner = self.lock()?;
            inner
                .runs
                .get(run_id)
                .cloned()
                .ok_or_else(|| StorageError::RunNotFound {
                    run_id: run_id.to_string(),
                })?
        };
        let results = self.list_results(run_id).await?;
        Ok(run.with_results(results))
    }

    async fn list_runs(&self) -> StorageResult<Vec<PromptTestResults>> {
        let inner = self.lock()?;
        let mut runs: Vec<PromptTestResults> = inner.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }
}
