// =============================================================================
// Data Point
// =============================================================================
//
// The unit of input for one SGD update: a feature vector and its scalar
// response. Observations arrive one at a time from whatever ingestion layer
// the host provides; the core reads them and never mutates them.
//
// The per-observation offset (e.g. log-exposure in Poisson rate models) is
// deliberately NOT stored here - it travels as a plain f64 argument next to
// the data point, because some callers compute it on the fly.
//
// =============================================================================

use ndarray::Array1;

/// One observation: feature vector `x` (length `d`) and scalar response `y`.
#[derive(Debug, Clone)]
pub struct DataPoint {
    /// Feature vector for this observation.
    pub x: Array1<f64>,
    /// Observed response.
    pub y: f64,
}

impl DataPoint {
    pub fn new(x: Array1<f64>, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean norm of the feature vector.
    ///
    /// This is the `normx` quantity the implicit solver reduces along: with
    /// `theta_new = theta_old + ksi * x`, the linear predictor moves by
    /// exactly `normx * ksi`.
    pub fn norm_squared(&self) -> f64 {
        self.x.dot(&self.x)
    }
}
