// =============================================================================
// Implicit-SGD Update Solver
// =============================================================================
//
// THE FIXED-POINT EQUATION
// ------------------------
// The implicit update evaluates the gradient at the new iterate:
//
//     theta_new = theta_old + a_t * (y - h(x'theta_new + offset)) * x
//
// The displacement is always along x, so write theta_new = theta_old + ksi*x.
// With normx = ||x||^2 the linear predictor moves by exactly normx * ksi,
// and ksi must solve the scalar fixed-point equation
//
//     ksi = a_t * g(ksi),    g(ksi) = y - h(x'theta_old + normx*ksi + offset)
//
// Once ksi* is found, theta_new = theta_old + ksi* * x satisfies the
// implicit update exactly.
//
// ROOT FINDING
// ------------
// We find the root of the residual F(u) = u - a_t*g(u). Every transfer is
// monotone nondecreasing, so g is nonincreasing and F is nondecreasing:
// the root is unique and bracketed by [min(0, r), max(0, r)] with
// r = a_t*g(0). The finder runs a Halley iteration (value + two
// derivatives) and falls back to bisection whenever the polished step would
// leave the bracket, because transfers like the logistic have bounded
// ranges that a raw Newton step happily overshoots.
//
// Per call the finder moves through: Init (bracket + midpoint guess) ->
// Iterate (Halley step, clipped to the bracket) -> Converged (residual
// below epsilon) or MaxIterExceeded. Domain violations are caught during
// Init: if `valideta` rejects the bracket there is nothing to iterate on
// and the step fails with a domain error, leaving theta untouched.
//
// =============================================================================

use ndarray::Array1;

use crate::data::DataPoint;
use crate::error::{Result, SgdError};
use crate::experiment::{Experiment, GlmModel};

/// Iteration budget for one root-finding call. Bisection alone resolves a
/// bracket to machine precision in ~60 halvings, so this is generous.
const MAX_ITERATIONS: usize = 100;

// =============================================================================
// Gradient Coefficient Along the Search Line
// =============================================================================

/// The 1-D reduction of the model gradient along the direction of x:
/// `value(ksi) = y - h(x'theta_old + normx*ksi + offset)`, plus the first
/// two derivatives of the transfer term along that line.
pub struct GradCoeff<'a> {
    model: &'a GlmModel,
    datapoint: &'a DataPoint,
    normx: f64,
    /// Cached x'theta_old + offset.
    eta0: f64,
}

impl<'a> GradCoeff<'a> {
    pub fn new(
        model: &'a GlmModel,
        datapoint: &'a DataPoint,
        theta_old: &Array1<f64>,
        normx: f64,
        offset: f64,
    ) -> Self {
        let eta0 = datapoint.x.dot(theta_old) + offset;
        Self { model, datapoint, normx, eta0 }
    }

    fn eta(&self, ksi: f64) -> f64 {
        self.eta0 + self.normx * ksi
    }

    /// g(ksi) = y - h(eta(ksi)).
    pub fn value(&self, ksi: f64) -> f64 {
        self.datapoint.y - self.model.transfer().transfer(self.eta(ksi))
    }

    /// Derivative of the transfer term along the line: h'(eta) * normx.
    /// (Equals -g'(ksi).)
    pub fn first_derivative(&self, ksi: f64) -> f64 {
        self.model.transfer().first_derivative(self.eta(ksi)) * self.normx
    }

    /// Second derivative of the transfer term: h''(eta) * normx^2.
    pub fn second_derivative(&self, ksi: f64) -> f64 {
        self.model.transfer().second_derivative(self.eta(ksi)) * self.normx * self.normx
    }

    /// Is the linear predictor at ksi inside the transfer's valid domain?
    pub fn valideta(&self, ksi: f64) -> bool {
        self.model.transfer().valideta(self.eta(ksi))
    }
}

// =============================================================================
// Fixed-Point Residual
// =============================================================================

/// The residual F(u) = u - a_t*g(u) and its first two derivatives, packaged
/// for a Halley-class iteration.
pub struct ImplicitFn<'a> {
    at: f64,
    g: &'a GradCoeff<'a>,
}

impl<'a> ImplicitFn<'a> {
    pub fn new(at: f64, g: &'a GradCoeff<'a>) -> Self {
        Self { at, g }
    }

    /// Returns (F(u), F'(u), F''(u)).
    pub fn eval(&self, u: f64) -> (f64, f64, f64) {
        let value = u - self.at * self.g.value(u);
        let first = 1.0 + self.at * self.g.first_derivative(u);
        let second = self.at * self.g.second_derivative(u);
        (value, first, second)
    }
}

// =============================================================================
// Root Finder
// =============================================================================

struct RootResult {
    root: f64,
    iterations: usize,
    converged: bool,
    /// Residual at the returned point, for trace output.
    residual: f64,
}

/// Bracketed root find for a nondecreasing residual, using value plus two
/// derivatives. Halley steps where they stay inside the bracket, bisection
/// otherwise; the bracket shrinks every iteration from the residual's sign.
fn find_root<F>(f: F, mut lo: f64, mut hi: f64, epsilon: f64, max_iter: usize) -> RootResult
where
    F: Fn(f64) -> (f64, f64, f64),
{
    let mut x = 0.5 * (lo + hi);
    let mut residual = f64::INFINITY;

    for iteration in 1..=max_iter {
        let (value, first, second) = f(x);
        residual = value;

        if value.abs() < epsilon {
            return RootResult { root: x, iterations: iteration, converged: true, residual };
        }

        // F is nondecreasing, so the residual's sign tells which side of
        // the root we are on.
        if value > 0.0 {
            hi = x;
        } else {
            lo = x;
        }

        // Halley step: x - 2FF' / (2F'^2 - FF''). Reduces to Newton when
        // F'' = 0.
        let denom = 2.0 * first * first - value * second;
        let candidate = if denom != 0.0 {
            x - 2.0 * value * first / denom
        } else if first != 0.0 {
            x - value / first
        } else {
            f64::NAN
        };

        // Clip to the bracket: a derivative step that leaves the known
        // bracket (or is not finite) is replaced by a bisection step.
        x = if candidate.is_finite() && candidate > lo && candidate < hi {
            candidate
        } else {
            0.5 * (lo + hi)
        };
    }

    RootResult { root: x, iterations: max_iter, converged: false, residual }
}

// =============================================================================
// Implicit Update Entry Point
// =============================================================================

/// How a single implicit update was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// The root finder met the residual tolerance.
    Converged,
    /// Zero-norm feature vector: the fixed-point equation degenerates to
    /// ksi = 0. Deterministic, not an error, but distinguished from a
    /// genuine convergence.
    Degenerate,
    /// The root finder exhausted its budget; the returned displacement is
    /// the explicit gradient step instead (and a warning was logged).
    ExplicitFallback,
}

/// Result of one implicit update: the displacement to add to theta, and how
/// it was obtained.
#[derive(Debug, Clone)]
pub struct ImplicitUpdate {
    pub displacement: Array1<f64>,
    pub status: SolverStatus,
}

/// Solve the implicit-SGD fixed-point equation for one observation and
/// return the displacement `ksi* * x` (so the caller does
/// `theta += displacement`).
///
/// # Errors
/// * `Unsupported` - the experiment has no bound transfer (estimating
///   equations have no 1-D reduction to root).
/// * `Configuration` - dimension mismatch, or a step size that is not a
///   finite nonnegative scalar.
/// * `Domain` - `valideta` rejects the search bracket; theta must be left
///   unchanged by the caller.
///
/// A convergence failure is NOT an error: per policy the update falls back
/// to the explicit gradient step, logs a warning, and reports
/// `SolverStatus::ExplicitFallback` so the caller is never handed an
/// unconverged root silently. Use [`implicit_update_strict`] to get
/// `ConvergenceFailure` as an error instead.
pub fn implicit_update(
    experiment: &Experiment,
    theta_old: &Array1<f64>,
    datapoint: &DataPoint,
    offset: f64,
    at: f64,
) -> Result<ImplicitUpdate> {
    implicit_update_impl(experiment, theta_old, datapoint, offset, at, true)
}

/// Like [`implicit_update`], but a root find that exhausts its budget is an
/// error (`ConvergenceFailure`) rather than an explicit-step fallback.
/// Theta is left unchanged on error.
pub fn implicit_update_strict(
    experiment: &Experiment,
    theta_old: &Array1<f64>,
    datapoint: &DataPoint,
    offset: f64,
    at: f64,
) -> Result<ImplicitUpdate> {
    implicit_update_impl(experiment, theta_old, datapoint, offset, at, false)
}

fn implicit_update_impl(
    experiment: &Experiment,
    theta_old: &Array1<f64>,
    datapoint: &DataPoint,
    offset: f64,
    at: f64,
    fallback_on_budget: bool,
) -> Result<ImplicitUpdate> {
    let model = experiment.glm_model().ok_or_else(|| {
        SgdError::Unsupported(
            "implicit updates require a GLM experiment with a bound transfer".to_string(),
        )
    })?;

    if theta_old.len() != experiment.d() || datapoint.x.len() != experiment.d() {
        return Err(SgdError::Configuration(format!(
            "dimension mismatch: experiment has d = {}, theta has {} and x has {}",
            experiment.d(),
            theta_old.len(),
            datapoint.x.len()
        )));
    }
    if !(at.is_finite() && at >= 0.0) {
        return Err(SgdError::Configuration(format!(
            "implicit update requires a finite nonnegative step size, got {}",
            at
        )));
    }

    // Zero feature vector: the linear predictor cannot move along x, the
    // equation degenerates to ksi = 0, and the displacement is zero.
    let normx = datapoint.norm_squared();
    if normx == 0.0 {
        return Ok(ImplicitUpdate {
            displacement: Array1::zeros(experiment.d()),
            status: SolverStatus::Degenerate,
        });
    }

    let g = GradCoeff::new(model, datapoint, theta_old, normx, offset);

    // Bracket the root: r = a_t*g(0). F(0) = -r and F(r) has the opposite
    // sign because g is nonincreasing, so the root lies between 0 and r.
    if !g.valideta(0.0) {
        return Err(SgdError::Domain(format!(
            "linear predictor {} is outside the valid domain of the {} transfer",
            g.eta(0.0),
            model.transfer().name()
        )));
    }
    let r = at * g.value(0.0);
    let (lo, hi) = if r < 0.0 { (r, 0.0) } else { (0.0, r) };

    // The inverse transfer excludes an interior eta (the pole at 0), and the
    // raw bracket's eta range can straddle it. F is monotone only on one
    // side of the pole, and it diverges approaching the pole from the side
    // holding ksi = 0, so the root cannot cross it: clip the bracket at the
    // pole. The finder only evaluates strictly inside the bracket, so the
    // pole itself is never sampled.
    let (lo, hi) = match model.transfer().excluded_eta() {
        Some(pole) if g.eta(lo) < pole && pole < g.eta(hi) => {
            let ksi_pole = (pole - g.eta(0.0)) / normx;
            if ksi_pole > 0.0 {
                (lo, ksi_pole)
            } else {
                (ksi_pole, hi)
            }
        }
        _ => (lo, hi),
    };

    if !g.valideta(0.5 * (lo + hi)) {
        return Err(SgdError::Domain(format!(
            "no valid bracket for the implicit update: eta range [{}, {}] leaves the {} transfer's domain",
            g.eta(lo),
            g.eta(hi),
            model.transfer().name()
        )));
    }

    if lo == hi {
        // g(0) = 0: theta_old already solves the update.
        return Ok(ImplicitUpdate {
            displacement: Array1::zeros(experiment.d()),
            status: SolverStatus::Converged,
        });
    }

    let implicit_fn = ImplicitFn::new(at, &g);
    let result = find_root(
        |u| implicit_fn.eval(u),
        lo,
        hi,
        experiment.epsilon(),
        MAX_ITERATIONS,
    );

    if experiment.config().trace {
        log::debug!(
            "implicit update: root = {:.6e}, residual = {:.3e}, iterations = {}",
            result.root,
            result.residual,
            result.iterations
        );
    }

    if result.converged {
        Ok(ImplicitUpdate {
            displacement: result.root * &datapoint.x,
            status: SolverStatus::Converged,
        })
    } else if !fallback_on_budget {
        Err(SgdError::ConvergenceFailure { iterations: result.iterations })
    } else {
        // Never hand back an unconverged root: take the explicit gradient
        // step for this observation and say so.
        log::warn!(
            "implicit solver hit the {}-iteration budget (residual {:.3e} > epsilon {:.3e}); \
             falling back to the explicit step",
            MAX_ITERATIONS,
            result.residual.abs(),
            experiment.epsilon()
        );
        let grad = model.gradient(theta_old, datapoint, offset);
        Ok(ImplicitUpdate {
            displacement: at * &grad,
            status: SolverStatus::ExplicitFallback,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
