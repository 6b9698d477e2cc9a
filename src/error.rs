//! Error taxonomy for a single initialization attempt.
//!
//! Every variant aborts the current `initialize_map` call without touching
//! the caller's map; the caller is expected to retry with a fresh image
//! pair rather than treat any of these as unrecoverable.

use thiserror::Error;

/// Failure modes of one two-view initialization attempt.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// Fewer correspondences than the estimators need.
    #[error("insufficient correspondences: found {found}, need at least {required}")]
    InsufficientCorrespondences { found: usize, required: usize },

    /// The two correspondence lists are not index-aligned.
    #[error("correspondence lists differ in length: {reference} reference vs {target} target")]
    LengthMismatch { reference: usize, target: usize },

    /// The robust estimator could not produce a model at all (e.g. a
    /// degenerate, collinear configuration). Distinct from a model that
    /// was computed but scores poorly.
    #[error("robust fit failed for the {0} model")]
    FitFailure(&'static str),

    /// Neither motion model explains any correspondence.
    #[error("no geometric consensus: both model scores are zero")]
    SelectionFailure,

    /// No algebraic pose candidate placed enough points in front of both
    /// cameras, or two candidates were indistinguishable.
    #[error("no pose candidate passed the cheirality test")]
    DisambiguationFailure,

    /// SVD failure, point at infinity, or a non-invertible model matrix.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// Error surfaced by an OpenCV primitive.
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}
