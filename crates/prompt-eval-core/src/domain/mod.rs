//! Evaluation inputs, outcomes, and their error types.

pub mod error;
pub mod prompt;
pub mod summary;
pub mod test_case;

pub use error::{EmbeddingTarget, EvaluationError, FixtureError, PreconditionError};
pub use prompt::PromptCandidate;
pub use summary::RunSummary;
pub use test_case::{load_test_cases, parse_test_cases, Bio, Context, TestCase};
