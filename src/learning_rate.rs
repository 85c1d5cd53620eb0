// =============================================================================
// Learning-Rate Schedules
// =============================================================================
//
// A schedule turns (current theta, observation, offset, iteration index)
// into a step size. Three variants:
//
//   - ONE-DIM: the classic Robbins-Monro decay
//         a_t = scale * gamma / (1 + gamma * alpha * t)^c
//     Purely a function of t; no internal state.
//
//   - ONE-DIM EIGEN: a scalar step adapted to local curvature. The Fisher
//     information is estimated by the expected outer product of per-step
//     gradients E[g g']; its largest eigenvalue is bounded below by
//     trace/d, and the trace is estimated online by the running mean of
//     ||g_t||^2. With lambda_hat = sum ||g_i||^2 / (d*t), the Robbins-Monro
//     scaling a_t = 1/(lambda_hat * t) reduces to d / sum ||g_i||^2.
//     The accumulator only ever grows, so the step never increases.
//
//   - D-DIM: an AdaGrad-style diagonal. One accumulator per coordinate,
//     seeded at 1 and bumped by alpha * g_i^2 each call; the step for
//     coordinate i is accum_i^(-c). Coordinates with more accumulated
//     gradient evidence anneal faster.
//
// The adaptive variants evaluate the gradient through an injected callback
// (`GradFn`) supplied by the owning experiment at construction, so the
// schedule stays decoupled from the model that feeds it.
//
// DETERMINISM CONTRACT
// --------------------
// Identical hyperparameters plus an identical call sequence must produce
// identical output, and `reset()` must restore the freshly-constructed
// state so a replay is indistinguishable from a fresh schedule.
//
// =============================================================================

use std::sync::Arc;

use ndarray::Array1;

use crate::data::DataPoint;
use crate::error::{Result, SgdError};

/// Gradient-evaluation capability injected into adaptive schedules:
/// `(theta, datapoint, offset) -> gradient vector`.
pub type GradFn = Arc<dyn Fn(&Array1<f64>, &DataPoint, f64) -> Array1<f64>>;

// =============================================================================
// Step-Size Value
// =============================================================================

/// The value a schedule produces: a scalar step or a diagonal step matrix
/// (stored as its diagonal).
#[derive(Debug, Clone)]
pub enum StepSize {
    Scalar(f64),
    Diagonal(Array1<f64>),
}

impl StepSize {
    /// The scalar step, if this is a scalar schedule's output. The implicit
    /// solver requires a scalar step.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            StepSize::Scalar(a) => Some(*a),
            StepSize::Diagonal(_) => None,
        }
    }

    /// Apply the step to a gradient: `a * grad` or `diag(a) * grad`.
    pub fn scale_gradient(&self, grad: &Array1<f64>) -> Array1<f64> {
        match self {
            StepSize::Scalar(a) => grad * *a,
            StepSize::Diagonal(d) => d * grad,
        }
    }
}

// =============================================================================
// Schedule Variants
// =============================================================================

/// One-dimensional decaying schedule; stateless beyond its hyperparameters.
#[derive(Debug, Clone)]
pub struct OneDimRate {
    gamma: f64,
    alpha: f64,
    c: f64,
    scale: f64,
}

impl OneDimRate {
    pub fn new(gamma: f64, alpha: f64, c: f64, scale: f64) -> Result<Self> {
        for (name, v) in [("gamma", gamma), ("alpha", alpha), ("c", c), ("scale", scale)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(SgdError::Configuration(format!(
                    "one-dim learning rate requires {} > 0, got {}",
                    name, v
                )));
            }
        }
        Ok(Self { gamma, alpha, c, scale })
    }

    fn step(&self, t: usize) -> f64 {
        self.scale * self.gamma / (1.0 + self.gamma * self.alpha * t as f64).powf(self.c)
    }
}

/// Curvature-adaptive scalar schedule; see the module header for the
/// eigenvalue-bound derivation.
pub struct OneDimEigenRate {
    grad_fn: GradFn,
    /// Running sum of squared gradient norms. Monotone nondecreasing.
    sum_sq: f64,
}

impl OneDimEigenRate {
    pub fn new(grad_fn: GradFn) -> Self {
        Self { grad_fn, sum_sq: 0.0 }
    }

    fn step(&mut self, theta: &Array1<f64>, dp: &DataPoint, offset: f64, _t: usize, d: usize) -> f64 {
        let g = (self.grad_fn)(theta, dp, offset);
        self.sum_sq += g.dot(&g);
        if self.sum_sq > 0.0 {
            d as f64 / self.sum_sq
        } else {
            // Every gradient so far (including this one) was exactly zero,
            // so the step multiplies a zero vector anyway.
            0.0
        }
    }

    fn reset(&mut self) {
        self.sum_sq = 0.0;
    }
}

/// Per-coordinate diagonal schedule (AdaGrad-style).
pub struct DdimRate {
    grad_fn: GradFn,
    alpha: f64,
    c: f64,
    /// One accumulator per coordinate, seeded at 1.
    accum: Array1<f64>,
}

impl DdimRate {
    pub fn new(d: usize, alpha: f64, c: f64, grad_fn: GradFn) -> Result<Self> {
        if d == 0 {
            return Err(SgdError::Configuration(
                "d-dim learning rate requires dimensionality d >= 1".to_string(),
            ));
        }
        for (name, v) in [("alpha", alpha), ("c", c)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(SgdError::Configuration(format!(
                    "d-dim learning rate requires {} > 0, got {}",
                    name, v
                )));
            }
        }
        Ok(Self { grad_fn, alpha, c, accum: Array1::ones(d) })
    }

    fn step(&mut self, theta: &Array1<f64>, dp: &DataPoint, offset: f64) -> Array1<f64> {
        let g = (self.grad_fn)(theta, dp, offset);
        for (a, gi) in self.accum.iter_mut().zip(g.iter()) {
            *a += self.alpha * gi * gi;
        }
        self.accum.mapv(|a| a.powf(-self.c))
    }

    fn reset(&mut self) {
        self.accum.fill(1.0);
    }
}

// =============================================================================
// Unified Schedule
// =============================================================================

/// A learning-rate schedule, dispatched by closed enum. Owned by the
/// experiment; the accumulators inside the adaptive variants are the only
/// mutable state in the whole core.
pub enum LearnRate {
    OneDim(OneDimRate),
    OneDimEigen(OneDimEigenRate),
    Ddim(DdimRate),
}

impl LearnRate {
    /// Produce the step for iteration `t` (1-based) at the current iterate.
    ///
    /// `d` is the experiment's dimensionality; the d-dim variant's output
    /// length always matches it because the accumulator is sized at
    /// construction.
    pub fn step(
        &mut self,
        theta: &Array1<f64>,
        datapoint: &DataPoint,
        offset: f64,
        t: usize,
        d: usize,
    ) -> StepSize {
        match self {
            LearnRate::OneDim(r) => StepSize::Scalar(r.step(t)),
            LearnRate::OneDimEigen(r) => StepSize::Scalar(r.step(theta, datapoint, offset, t, d)),
            LearnRate::Ddim(r) => StepSize::Diagonal(r.step(theta, datapoint, offset)),
        }
    }

    /// Restore the freshly-constructed accumulator state.
    pub fn reset(&mut self) {
        match self {
            LearnRate::OneDim(_) => {}
            LearnRate::OneDimEigen(r) => r.reset(),
            LearnRate::Ddim(r) => r.reset(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LearnRate::OneDim(_) => "one-dim",
            LearnRate::OneDimEigen(_) => "one-dim-eigen",
            LearnRate::Ddim(_) => "d-dim",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Gaussian-identity gradient: (y - x'theta - offset) * x.
    fn gaussian_grad() -> GradFn {
        Arc::new(|theta: &Array1<f64>, dp: &DataPoint, offset: f64| {
            let eta = dp.x.dot(theta) + offset;
            (dp.y - eta) * &dp.x
        })
    }

    fn dp(x: Array1<f64>, y: f64) -> DataPoint {
        DataPoint::new(x, y)
    }

    #[test]
    fn test_one_dim_formula() {
        let r = OneDimRate::new(1.0, 1.0, 1.0, 1.0).unwrap();
        assert_abs_diff_eq!(r.step(1), 0.5);
        assert_abs_diff_eq!(r.step(2), 1.0 / 3.0);
        assert_abs_diff_eq!(r.step(3), 0.25);
    }

    #[test]
    fn test_one_dim_is_non_increasing() {
        let r = OneDimRate::new(0.7, 2.0, 0.6, 1.5).unwrap();
        let mut prev = f64::INFINITY;
        for t in 1..200 {
            let a = r.step(t);
            assert!(a <= prev, "step increased at t = {}", t);
            prev = a;
        }
    }

    #[test]
    fn test_one_dim_rejects_nonpositive_hyperparameters() {
        assert!(OneDimRate::new(0.0, 1.0, 1.0, 1.0).is_err());
        assert!(OneDimRate::new(1.0, -1.0, 1.0, 1.0).is_err());
        assert!(OneDimRate::new(1.0, 1.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_eigen_step_matches_accumulated_norms() {
        let mut r = LearnRate::OneDimEigen(OneDimEigenRate::new(gaussian_grad()));
        let theta = array![0.0, 0.0];
        let obs = dp(array![1.0, 1.0], 2.0);
        // Gradient is (2 - 0) * [1, 1], squared norm 8; step = d / 8.
        let s = r.step(&theta, &obs, 0.0, 1, 2);
        assert_abs_diff_eq!(s.scalar().unwrap(), 2.0 / 8.0);
        // Same observation again from the same theta doubles the sum.
        let s = r.step(&theta, &obs, 0.0, 2, 2);
        assert_abs_diff_eq!(s.scalar().unwrap(), 2.0 / 16.0);
    }

    #[test]
    fn test_eigen_step_is_non_increasing() {
        let mut r = LearnRate::OneDimEigen(OneDimEigenRate::new(gaussian_grad()));
        let theta = array![0.5];
        let mut prev = f64::INFINITY;
        for t in 1..50 {
            let obs = dp(array![1.0], (t % 5) as f64);
            let a = r.step(&theta, &obs, 0.0, t, 1).scalar().unwrap();
            assert!(a <= prev);
            prev = a;
        }
    }

    #[test]
    fn test_ddim_per_coordinate_shrinkage() {
        let mut r = LearnRate::Ddim(DdimRate::new(2, 1.0, 1.0, gaussian_grad()).unwrap());
        let theta = array![0.0, 0.0];
        // Only the first coordinate carries signal.
        let obs = dp(array![1.0, 0.0], 1.0);
        let mut prev = array![f64::INFINITY, f64::INFINITY];
        for t in 1..20 {
            let s = r.step(&theta, &obs, 0.0, t, 2);
            let diag = match s {
                StepSize::Diagonal(d) => d,
                _ => panic!("expected diagonal step"),
            };
            assert!(diag[0] <= prev[0]);
            assert!(diag[1] <= prev[1]);
            prev = diag;
        }
        // The quiet coordinate's accumulator never moved.
        assert_abs_diff_eq!(prev[1], 1.0);
        assert!(prev[0] < 1.0);
    }

    #[test]
    fn test_ddim_rejects_zero_dimension() {
        assert!(DdimRate::new(0, 1.0, 1.0, gaussian_grad()).is_err());
    }

    #[test]
    fn test_adaptive_replay_after_reset_is_identical() {
        let observations: Vec<DataPoint> = (0..10)
            .map(|i| dp(array![1.0, i as f64 * 0.1], (i % 3) as f64))
            .collect();
        let theta = array![0.2, -0.1];

        let mut r = LearnRate::OneDimEigen(OneDimEigenRate::new(gaussian_grad()));
        let first: Vec<f64> = observations
            .iter()
            .enumerate()
            .map(|(i, o)| r.step(&theta, o, 0.0, i + 1, 2).scalar().unwrap())
            .collect();
        r.reset();
        let second: Vec<f64> = observations
            .iter()
            .enumerate()
            .map(|(i, o)| r.step(&theta, o, 0.0, i + 1, 2).scalar().unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_step_size_scaling() {
        let g = array![2.0, -4.0];
        let s = StepSize::Scalar(0.5).scale_gradient(&g);
        assert_abs_diff_eq!(s[0], 1.0);
        assert_abs_diff_eq!(s[1], -2.0);
        let s = StepSize::Diagonal(array![1.0, 0.25]).scale_gradient(&g);
        assert_abs_diff_eq!(s[0], 2.0);
        assert_abs_diff_eq!(s[1], -1.0);
        assert!(StepSize::Diagonal(array![1.0]).scalar().is_none());
    }
}
