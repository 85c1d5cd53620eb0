// =============================================================================
// Error Types
// =============================================================================
//
// All fallible operations in this crate return `Result<T>` with one shared
// error enum. The boundaries where each kind can occur:
//
//   - Configuration: experiment construction and update entry points
//     (unknown names, missing attributes, bad hyperparameters, dimension
//     mismatches). Fatal to construction - there is no partially built
//     experiment.
//   - Domain: per-step evaluation (a linear predictor left the transfer
//     function's valid domain, or the implicit solver could not build a
//     valid bracket). Recoverable by the caller; theta is never touched.
//   - ConvergenceFailure: the implicit root finder exhausted its iteration
//     budget. The solver's own policy is to fall back to the explicit
//     gradient step and warn, so this usually surfaces as a status rather
//     than an error, but callers driving the root finder directly get it.
//   - Unsupported: a GLM-only contract (transfer/family pass-through,
//     implicit update) invoked on an estimating-equation experiment.
//
// =============================================================================

use thiserror::Error;

/// Errors that can occur while building or driving an SGD experiment.
#[derive(Error, Debug)]
pub enum SgdError {
    /// Unknown model/transfer/learning-rate name, missing required
    /// attribute, nonpositive hyperparameter, or dimension mismatch.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A linear predictor fell outside the transfer function's valid
    /// domain, or no valid bracket exists for the implicit solve.
    #[error("Domain error: {0}")]
    Domain(String),

    /// The implicit root finder did not meet epsilon within its budget.
    #[error("Implicit solver failed to converge after {iterations} iterations")]
    ConvergenceFailure { iterations: usize },

    /// A GLM-only operation was called on an experiment without a bound
    /// family/transfer pair (estimating-equation models).
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SgdError>;
