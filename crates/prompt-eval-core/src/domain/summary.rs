use prompt_eval_state::{PromptTestResults, ResultStatus, TestResultRecord};
use serde::Serialize;

/// Aggregate view of a run's result records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub done: usize,
    pub errored: usize,
    pub in_progress: usize,
    /// Mean score over DONE records; `None` if there are none
    pub mean_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl RunSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestResultRecord>) -> Self {
        let mut summary = RunSummary {
            total: 0,
            done: 0,
            errored: 0,
            in_progress: 0,
            mean_score: None,
            min_score: None,
            max_score: None,
        };
        let mut sum = 0.0;

        for record in results {
            summary.total += 1;
            match record.status {
                ResultStatus::InProgress => summary.in_progress += 1,
                ResultStatus::Error => summary.errored += 1,
                ResultStatus::Done => {
                    summary.done += 1;
                    if let Some(score) = record.cosine_similarity_score {
                        sum += score;
                        summary.min_score =
                            Some(summary.min_score.map_or(score, |m: f64| m.min(score)));
                        summary.max_score =
                            Some(summary.max_score.map_or(score, |m: f64| m.max(score)));
                    }
                }
            }
        }

        if summary.done > 0 {
            summary.mean_score = Some(sum / summary.done as f64);
        }
        summary
    }

    pub fn from_run(run: &PromptTestResults) -> Self {
        Self::from_results(run.test_results.values())
    }

    /// Every record reached DONE or ERROR.
    pub fn is_complete(&self) -> bool {
        self.in_progress == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use prompt_eval_state::{RunId, TestCaseId};

    fn record(id: &str, status: ResultStatus, score: Option<f64>) -> TestResultRecord {
        TestResultRecord {
            run_id: RunId("run".into()),
            test_case_id: TestCaseId::new(id),
            status,
            error_message: (status == ResultStatus::Error).then(|| "boom".to_string()),
            cosine_similarity_score: score,
            llm_completions: score.map(|_| vec!["x".to_string()]),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn counts_and_mean() {
        let records = vec![
            record("a", ResultStatus::Done, Some(0.5)),
            record("b", ResultStatus::Done, Some(1.0)),
            record("c", ResultStatus::Error, None),
            record("d", ResultStatus::InProgress, None),
        ];
        let s = RunSummary::from_results(&records);
        assert_eq!((s.total, s.done, s.errored, s.in_progress), (4, 2, 1, 1));
        assert_eq!(s.mean_score, Some(0.75));
        assert_eq!(s.min_score, Some(0.5));
        assert_eq!(s.max_score, Some(1.0));
        assert!(!s.is_complete());
    }

    #[test]
    fn no_done_records_has_no_mean() {
        let records = vec![record("a", ResultStatus::Error, None)];
        let s = RunSummary::from_results(&records);
        assert_eq!(s.mean_score, None);
        assert!(s.is_complete());
    }
}
