use thiserror::Error;

/// Errors surfaced by the ensemble-forecasting core.
///
/// All variants propagate to the immediate caller uncaught: a failure at any
/// single timestep or site aborts the entire enclosing ensemble call rather
/// than returning a partial or silently distorted result.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// No optimization attempt converged for a timestep's constraints.
    #[error("could not successfully fit distribution: {0}")]
    FitFailure(String),

    /// Parameters outside the feasible region of the hyperbolic family.
    #[error("invalid hyperbolic parameters: {0}")]
    InvalidParameters(String),

    /// The forecast table did not resolve to exactly one mean column after
    /// removing the two percentile-bound columns.
    #[error("ambiguous forecast columns, expected exactly one mean column, found: [{}]", .remaining.join(", "))]
    AmbiguousColumns { remaining: Vec<String> },

    /// Requested forecast horizon outside the supported set.
    #[error("invalid forecast horizon {0}, allowed horizons are 1, 4, 6 and 24 hours")]
    InvalidHorizon(u32),

    /// Mismatched table dimensions or timestamp indexes.
    #[error("table shape error: {0}")]
    Shape(String),

    /// Failure reported by an external collaborator (site catalog or
    /// forecast provider).
    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EnsembleError>;
