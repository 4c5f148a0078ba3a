//! Structured lifecycle events for test-case evaluations.
//!
//! Every evaluation runs inside an [`evaluation_span`] carrying its run and
//! test case ids. Events are `info!` unless noted and carry an `event`
//! field (`evaluation.started`, `evaluation.finished`, ...) for filtering.

use std::fmt::Display;

use prompt_eval_state::{ResultStatus, RunId, TestCaseId};
use tracing::{info, warn};

/// Span for one `process_test_case` invocation.
///
/// Attach with `tracing::Instrument::instrument` so it follows the future
/// across await points and threads.
pub fn evaluation_span(run_id: &RunId, test_case_id: &TestCaseId) -> tracing::Span {
    tracing::info_span!(
        "prompt_eval.evaluation",
        run_id = %run_id,
        test_case_id = %test_case_id,
    )
}

pub fn emit_evaluation_started(run_id: &RunId, test_case_id: &TestCaseId, llm_model: &str) {
    info!(
        event = "evaluation.started",
        run_id = %run_id,
        test_case_id = %test_case_id,
        llm_model = %llm_model,
    );
}

/// A service attempt failed or timed out (warning level).
pub fn emit_attempt_failed(operation: &str, attempt: u32, max_attempts: u32, error: &dyn Display) {
    warn!(
        event = "attempt.failed",
        operation = %operation,
        attempt = attempt,
        max_attempts = max_attempts,
        error = %error,
    );
}

pub fn emit_evaluation_finished(
    run_id: &RunId,
    test_case_id: &TestCaseId,
    status: ResultStatus,
    score: Option<f64>,
    duration_ms: u64,
) {
    info!(
        event = "evaluation.finished",
        run_id = %run_id,
        test_case_id = %test_case_id,
        status = %status,
        score = score,
        duration_ms = duration_ms,
    );
}

/// The result store rejected or failed a status write (warning level).
pub fn emit_status_write_failed(
    run_id: &RunId,
    test_case_id: &TestCaseId,
    status: ResultStatus,
    error: &dyn Display,
) {
    warn!(
        event = "status.write_failed",
        run_id = %run_id,
        test_case_id = %test_case_id,
        status = %status,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_span_enters() {
        let span = evaluation_span(&RunId("run-1".into()), &TestCaseId::new("tc-1"));
        let _guard = span.enter();
        emit_evaluation_started(&RunId("run-1".into()), &TestCaseId::new("tc-1"), "m");
    }
}
