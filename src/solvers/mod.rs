// =============================================================================
// SGD Update Solvers
// =============================================================================
//
// Two ways to advance theta by one observation:
//
//   EXPLICIT:  theta_new = theta_old + a_t * gradient(theta_old)
//     The gradient is evaluated at the CURRENT iterate and scaled by the
//     step. Cheap, but sensitive to the step size: too large and the
//     iterates blow up.
//
//   IMPLICIT:  theta_new = theta_old + a_t * gradient(theta_new)
//     The gradient is evaluated at the NEW iterate, which makes the update
//     a fixed-point equation. Solving it costs a 1-D root find per step,
//     but the update is contractive and far more robust to the step size.
//
// The implicit machinery lives in the `implicit` submodule; this module
// holds the explicit path (which is also the implicit solver's fallback
// when the root find does not converge).
//
// =============================================================================

pub mod implicit;

pub use implicit::{
    implicit_update, implicit_update_strict, GradCoeff, ImplicitFn, ImplicitUpdate, SolverStatus,
};

use ndarray::Array1;

use crate::data::DataPoint;
use crate::error::Result;
use crate::experiment::Experiment;
use crate::learning_rate::StepSize;

/// Explicit-SGD displacement: the gradient at the current iterate scaled by
/// the step. The caller adds this to theta.
pub fn explicit_update(
    experiment: &Experiment,
    theta_old: &Array1<f64>,
    datapoint: &DataPoint,
    offset: f64,
    step: &StepSize,
) -> Result<Array1<f64>> {
    let grad = experiment.gradient(theta_old, datapoint, offset)?;
    Ok(step.scale_gradient(&grad))
}

// =============================================================================
// Tests
// =============================================================================
