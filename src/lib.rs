// =============================================================================
// RustySGD Core Library
// =============================================================================
//
// Online (streaming) stochastic gradient descent for generalized linear
// models: one observation in, one parameter update out.
//
// STRUCTURE:
// ----------
// The library is organized into modules, each handling a specific concern:
//
//   - data:          The per-step observation type (feature vector + response)
//   - families:      Distribution families (Gaussian, Poisson, Binomial, Gamma)
//   - transfers:     Transfer functions - inverse links - with derivatives
//                    and domain predicates (Identity, Exp, Inverse, Logistic)
//   - learning_rate: Step-size schedules (decaying scalar, curvature-adaptive
//                    scalar, AdaGrad-style diagonal)
//   - experiment:    Ties a model to a schedule and exposes the gradient
//   - solvers:       The explicit update and the implicit fixed-point update
//                    (a bracketed 1-D root solve per observation)
//   - error:         Error types used throughout the library
//
// TWO UPDATE RULES:
// -----------------
// Explicit SGD evaluates the gradient at the current iterate; implicit SGD
// evaluates it at the new iterate, which requires solving a scalar equation
// per step but is dramatically more stable for aggressive step sizes.
//
// The training loop (ingestion, stopping, reporting) lives with the caller;
// this crate is the per-step core: given (x, y, offset), produce the next
// theta displacement.
//
// =============================================================================

pub mod data;
pub mod error;
pub mod experiment;
pub mod families;
pub mod learning_rate;
pub mod solvers;
pub mod transfers;

// Re-export commonly used items at the top level for convenience.
// Users can write `use rustysgd::Experiment` instead of
// `use rustysgd::experiment::Experiment`.
pub use data::DataPoint;
pub use error::{Result, SgdError};
pub use experiment::{Experiment, ExperimentConfig, GlmModel};
pub use families::Family;
pub use learning_rate::{GradFn, LearnRate, StepSize};
pub use solvers::{
    explicit_update, implicit_update, implicit_update_strict, ImplicitUpdate, SolverStatus,
};
pub use transfers::Transfer;
