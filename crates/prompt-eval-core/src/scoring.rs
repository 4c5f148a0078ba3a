//! Vector averaging and cosine similarity.
//!
//! All arithmetic is `f64`. A score is accepted only if it is finite and
//! within `[-1, 1]`; anything else is a [`ScoringError`].

use thiserror::Error;

use crate::clients::Embedding;

/// Rounding slack allowed at the ends of `[-1, 1]` before a score counts
/// as out of range. Values inside the slack are clamped.
const BOUND_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("cannot average an empty set of vectors")]
    EmptyInput,

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{which} vector has zero magnitude")]
    DegenerateVector { which: &'static str },

    #[error("similarity score {score} is outside [-1, 1]")]
    RangeViolation { score: f64 },
}

/// Component-wise arithmetic mean of one or more equal-length vectors.
///
/// A single input is returned unchanged.
pub fn average_of_vectors(vectors: &[Embedding]) -> Result<Embedding, ScoringError> {
    let first = vectors.first().ok_or(ScoringError::EmptyInput)?;
    let dim = first.len();
    if dim == 0 {
        return Err(ScoringError::EmptyInput);
    }

    let mut sum = vec![0.0_f64; dim];
    for v in vectors {
        if v.len() != dim {
            return Err(ScoringError::DimensionMismatch {
                expected: dim,
                actual: v.len(),
            });
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }

    let n = vectors.len() as f64;
    Ok(sum.into_iter().map(|s| s / n).collect())
}

/// `(a · b) / (‖a‖ ‖b‖)`.
///
/// Each vector is first divided by its largest absolute component, so
/// finite inputs near either end of the `f64` range neither overflow nor
/// underflow. An all-zero input is rejected rather than producing NaN.
/// The result passes through [`check_score`].
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, ScoringError> {
    if a.is_empty() || b.is_empty() {
        return Err(ScoringError::EmptyInput);
    }
    if a.len() != b.len() {
        return Err(ScoringError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let a = normalized(a).ok_or(ScoringError::DegenerateVector { which: "first" })?;
    let b = normalized(b).ok_or(ScoringError::DegenerateVector { which: "second" })?;

    let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    check_score(dot / (magnitude(&a) * magnitude(&b)))
}

/// Accept a score in `[-1, 1]`, clamping rounding overshoot.
pub fn check_score(score: f64) -> Result<f64, ScoringError> {
    if !score.is_finite() {
        return Err(ScoringError::RangeViolation { score });
    }
    if (-1.0..=1.0).contains(&score) {
        return Ok(score);
    }
    if score.abs() <= 1.0 + BOUND_EPSILON {
        return Ok(score.clamp(-1.0, 1.0));
    }
    Err(ScoringError::RangeViolation { score })
}

/// Average each side, then compare the two averages.
///
/// `generated` holds embeddings of the model's completions, `reference`
/// those of the test case's good completions.
pub fn score_embeddings(
    generated: &[Embedding],
    reference: &[Embedding],
) -> Result<f64, ScoringError> {
    let generated = average_of_vectors(generated)?;
    let reference = average_of_vectors(reference)?;
    cosine_similarity(&generated, &reference).map_err(|err| match err {
        ScoringError::DegenerateVector { which: "first" } => ScoringError::DegenerateVector {
            which: "generated",
        },
        ScoringError::DegenerateVector { .. } => ScoringError::DegenerateVector {
            which: "reference",
        },
        other => other,
    })
}

/// `v` divided by its largest absolute component, or `None` when every
/// component is zero. NaN components are carried through.
fn normalized(v: &[f64]) -> Option<Vec<f64>> {
    let scale = v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    if scale == 0.0 && !v.iter().any(|x| x.is_nan()) {
        return None;
    }
    Some(v.iter().map(|x| x / scale).collect())
}

fn magnitude(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
