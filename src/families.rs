// =============================================================================
// Distribution Families
// =============================================================================
//
// A family describes how the response varies around its mean:
//
//   - variance(mu): the variance function V(mu), so Var(Y) = phi * V(mu).
//   - deviance(y, mu, wt): goodness-of-fit, the weighted sum of canonical
//     unit deviances. Lower is better. Used only for reporting and
//     convergence checks - the gradient never touches it.
//
// The four classical GLM families are supported. Each is stateless, so the
// enum is Copy and dispatch is a plain match.
//
// =============================================================================

use ndarray::Array1;

use crate::error::{Result, SgdError};

/// Distribution family variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Gaussian,
    Poisson,
    Binomial,
    Gamma,
}

impl Family {
    /// Resolve a family from its model name.
    ///
    /// Case-insensitive; unknown names fail fast instead of silently
    /// defaulting.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "gaussian" | "normal" => Ok(Family::Gaussian),
            "poisson" => Ok(Family::Poisson),
            "binomial" => Ok(Family::Binomial),
            "gamma" => Ok(Family::Gamma),
            _ => Err(SgdError::Configuration(format!(
                "Unknown model '{}'. Use 'gaussian', 'poisson', 'binomial', or 'gamma'.",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Family::Gaussian => "gaussian",
            Family::Poisson => "poisson",
            Family::Binomial => "binomial",
            Family::Gamma => "gamma",
        }
    }

    /// Variance function V(mu). Nonnegative over the mean's valid domain.
    pub fn variance(&self, mu: f64) -> f64 {
        match self {
            Family::Gaussian => 1.0,
            Family::Poisson => mu,
            Family::Binomial => mu * (1.0 - mu),
            Family::Gamma => mu * mu,
        }
    }

    /// Weighted deviance: sum over observations of wt_i * d(y_i, mu_i),
    /// where d is the family's canonical unit deviance.
    ///
    /// The y*ln(y/mu) terms are defined as 0 when y = 0 (the usual limit
    /// convention), so Poisson counts of zero and binomial 0/1 responses
    /// are handled exactly.
    pub fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>, wt: &Array1<f64>) -> f64 {
        y.iter()
            .zip(mu.iter())
            .zip(wt.iter())
            .map(|((&yi, &mui), &wi)| wi * self.unit_deviance(yi, mui))
            .sum()
    }

    /// Canonical unit deviance d(y, mu) for a single observation.
    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        match self {
            Family::Gaussian => {
                let r = y - mu;
                r * r
            }
            Family::Poisson => 2.0 * (ylogydmu(y, mu) - (y - mu)),
            Family::Binomial => 2.0 * (ylogydmu(y, mu) + ylogydmu(1.0 - y, 1.0 - mu)),
            Family::Gamma => 2.0 * ((y - mu) / mu - (y / mu).ln()),
        }
    }
}

/// y * ln(y / mu), with the y -> 0 limit taken as 0.
fn ylogydmu(y: f64, mu: f64) -> f64 {
    if y > 0.0 {
        y * (y / mu).ln()
    } else {
        0.0
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

    #[test]
    fn test_from_name_resolution() {
        assert_eq!(Family::from_name("Gaussian").unwrap(), Family::Gaussian);
        assert_eq!(Family::from_name("poisson").unwrap(), Family::Poisson);
        assert!(matches!(
            Family::from_name("tweedie").unwrap_err(),
            SgdError::Configuration(_)
        ));
    }

    #[test]
    fn test_variance_functions() {
        assert_eq!(Family::Gaussian.variance(7.3), 1.0);
        assert_eq!(Family::Poisson.variance(2.5), 2.5);
        assert_abs_diff_eq!(Family::Binomial.variance(0.25), 0.1875);
        assert_eq!(Family::Gamma.variance(3.0), 9.0);
    }

    #[test]
    fn test_variance_nonnegative_on_valid_domain() {
        for mu in [0.01, 0.3, 0.7, 0.99] {
            assert!(Family::Binomial.variance(mu) >= 0.0);
        }
        for mu in [0.1, 1.0, 50.0] {
            assert!(Family::Poisson.variance(mu) >= 0.0);
            assert!(Family::Gamma.variance(mu) >= 0.0);
        }
    }

    #[test]
    fn test_gaussian_deviance_is_weighted_sum_of_squares() {
        let y = array![1.0, 2.0, 3.0];
        let mu = array![1.1, 1.9, 3.2];
        let wt = array![1.0, 1.0, 1.0];
        let dev = Family::Gaussian.deviance(&y, &mu, &wt);
        // 0.01 + 0.01 + 0.04
        assert_abs_diff_eq!(dev, 0.06, epsilon = 1e-12);
    }

    #[test]
    fn test_poisson_deviance_handles_zero_counts() {
        // Unit deviance at y = 0 reduces to 2 * mu.
        let y = array![0.0];
        let mu = array![1.5];
        let wt = array![1.0];
        let dev = Family::Poisson.deviance(&y, &mu, &wt);
        assert_abs_diff_eq!(dev, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_binomial_deviance_at_perfect_fit_is_zero() {
        let y = array![0.0, 1.0, 0.5];
        let dev = Family::Binomial.deviance(&y, &y.clone(), &array![1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(dev, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_gamma_deviance_at_perfect_fit_is_zero() {
        let y = array![0.5, 2.0, 4.0];
        let dev = Family::Gamma.deviance(&y, &y.clone(), &array![1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(dev, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deviance_respects_weights() {
        let y = array![1.0, 2.0];
        let mu = array![1.1, 1.9];
        let wt = array![2.0, 0.0];
        let dev = Family::Gaussian.deviance(&y, &mu, &wt);
        assert_abs_diff_eq!(dev, 0.02, epsilon = 1e-12);
    }
}
