// =============================================================================
// Transfer Functions
// =============================================================================
//
// A transfer function h maps a linear predictor eta = x'theta + offset to the
// mean response mu. It is the inverse of the link function:
//
//     mu = h(eta)        (transfer: predictor -> mean)
//     eta = g(mu)        (link: mean -> predictor)
//
// WHY THE GRADIENT NEEDS DERIVATIVES
// ----------------------------------
// The per-observation gradient is (y - h(eta)) * x, so the explicit path
// only needs h itself. The implicit path solves a scalar equation along the
// direction of x and wants h' and h'' as well, so every transfer carries its
// first two analytic derivatives.
//
// DOMAIN VALIDITY
// ---------------
// Each transfer has a domain where it is well-defined and numerically
// stable. `valideta` is that predicate; callers must check it before
// evaluating, and the implicit solver uses it to vet its search bracket.
//
// MONOTONICITY INVARIANT
// ----------------------
// Every variant here is monotone nondecreasing. The inverse transfer is
// written as -1/u (rather than 1/u) precisely so this holds. The implicit
// solver's bracket construction relies on it.
//
// =============================================================================

use ndarray::Array1;

use crate::error::{Result, SgdError};

/// Transfer function variants. All known at compile time, so a closed enum
/// with match dispatch replaces a trait-object hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// h(u) = u (canonical for Gaussian).
    Identity,
    /// h(u) = exp(u) (canonical for Poisson).
    Exp,
    /// h(u) = -1/u (canonical for Gamma, sign chosen to keep h increasing).
    Inverse,
    /// h(u) = 1/(1 + exp(-u)) (canonical for Binomial).
    Logistic,
}

impl Transfer {
    /// Resolve a transfer from its configuration name.
    ///
    /// Case-insensitive; unknown names fail fast instead of silently
    /// defaulting.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "identity" => Ok(Transfer::Identity),
            "exp" => Ok(Transfer::Exp),
            "inverse" => Ok(Transfer::Inverse),
            "logistic" => Ok(Transfer::Logistic),
            _ => Err(SgdError::Configuration(format!(
                "Unknown transfer '{}'. Use 'identity', 'exp', 'inverse', or 'logistic'.",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transfer::Identity => "identity",
            Transfer::Exp => "exp",
            Transfer::Inverse => "inverse",
            Transfer::Logistic => "logistic",
        }
    }

    /// Map a linear predictor to a mean: mu = h(u).
    pub fn transfer(&self, u: f64) -> f64 {
        match self {
            Transfer::Identity => u,
            Transfer::Exp => u.exp(),
            Transfer::Inverse => -1.0 / u,
            Transfer::Logistic => sigmoid(u),
        }
    }

    /// Elementwise transfer; agrees pointwise with the scalar form.
    pub fn transfer_vec(&self, u: &Array1<f64>) -> Array1<f64> {
        u.mapv(|ui| self.transfer(ui))
    }

    /// Map a mean back to a linear predictor: u = g(mu). Inverse of
    /// `transfer` on the valid domain.
    pub fn link(&self, mean: f64) -> f64 {
        match self {
            Transfer::Identity => mean,
            Transfer::Exp => mean.ln(),
            Transfer::Inverse => -1.0 / mean,
            Transfer::Logistic => (mean / (1.0 - mean)).ln(),
        }
    }

    /// First analytic derivative of `transfer` at u.
    pub fn first_derivative(&self, u: f64) -> f64 {
        match self {
            Transfer::Identity => 1.0,
            Transfer::Exp => u.exp(),
            Transfer::Inverse => 1.0 / (u * u),
            Transfer::Logistic => {
                let s = sigmoid(u);
                s * (1.0 - s)
            }
        }
    }

    /// Second analytic derivative of `transfer` at u.
    pub fn second_derivative(&self, u: f64) -> f64 {
        match self {
            Transfer::Identity => 0.0,
            Transfer::Exp => u.exp(),
            Transfer::Inverse => -2.0 / (u * u * u),
            Transfer::Logistic => {
                let s = sigmoid(u);
                s * (1.0 - s) * (1.0 - 2.0 * s)
            }
        }
    }

    /// The single eta excluded from the interior of the transfer's domain,
    /// if any. Only the inverse transfer has one (the pole at eta = 0); the
    /// implicit solver must keep its search bracket on one side of it.
    pub fn excluded_eta(&self) -> Option<f64> {
        match self {
            Transfer::Inverse => Some(0.0),
            _ => None,
        }
    }

    /// True iff `transfer` and its derivatives are well-defined and
    /// numerically stable at eta.
    pub fn valideta(&self, eta: f64) -> bool {
        match self {
            Transfer::Identity => eta.is_finite(),
            Transfer::Exp => eta.is_finite(),
            Transfer::Inverse => eta.is_finite() && eta != 0.0,
            Transfer::Logistic => eta.is_finite(),
        }
    }
}

/// Numerically stable logistic sigmoid: never exponentiates a large
/// positive argument.
fn sigmoid(u: f64) -> f64 {
    if u >= 0.0 {
        1.0 / (1.0 + (-u).exp())
    } else {
        let e = u.exp();
        e / (1.0 + e)
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
    fn test_from_name_is_case_insensitive() {
        assert_eq!(Transfer::from_name("Logistic").unwrap(), Transfer::Logistic);
        assert_eq!(Transfer::from_name("EXP").unwrap(), Transfer::Exp);
    }

    #[test]
    fn test_unknown_name_fails_fast() {
        let err = Transfer::from_name("probit").unwrap_err();
        assert!(matches!(err, SgdError::Configuration(_)));
    }

    #[test]
    fn test_logistic_transfer_link_roundtrip_on_open_unit_interval() {
        let t = Transfer::Logistic;
        for &mu in &[1e-6, 0.01, 0.25, 0.5, 0.75, 0.99, 1.0 - 1e-6] {
            assert_abs_diff_eq!(t.transfer(t.link(mu)), mu, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_logistic_output_stays_in_unit_interval() {
        let t = Transfer::Logistic;
        for &eta in &[-700.0, -30.0, 0.0, 30.0, 700.0] {
            let mu = t.transfer(eta);
            assert!((0.0..=1.0).contains(&mu), "mu = {} for eta = {}", mu, eta);
        }
    }

    #[test]
    fn test_logistic_valideta_rejects_nonfinite() {
        let t = Transfer::Logistic;
        assert!(t.valideta(100.0));
        assert!(!t.valideta(f64::INFINITY));
        assert!(!t.valideta(f64::NAN));
    }

    #[test]
    fn test_inverse_valideta_rejects_zero() {
        let t = Transfer::Inverse;
        assert!(t.valideta(-2.0));
        assert!(!t.valideta(0.0));
    }

    #[test]
    fn test_only_inverse_has_an_excluded_eta() {
        assert_eq!(Transfer::Inverse.excluded_eta(), Some(0.0));
        assert_eq!(Transfer::Identity.excluded_eta(), None);
        assert_eq!(Transfer::Exp.excluded_eta(), None);
        assert_eq!(Transfer::Logistic.excluded_eta(), None);
    }

    #[test]
    fn test_identity_and_exp_roundtrips() {
        assert_abs_diff_eq!(
            Transfer::Identity.link(Transfer::Identity.transfer(3.5)),
            3.5
        );
        assert_abs_diff_eq!(
            Transfer::Exp.transfer(Transfer::Exp.link(2.0)),
            2.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            Transfer::Inverse.transfer(Transfer::Inverse.link(4.0)),
            4.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        // Central differences at a handful of in-domain points.
        let h = 1e-5;
        let cases = [
            (Transfer::Identity, 0.7),
            (Transfer::Exp, 0.3),
            (Transfer::Inverse, -1.5),
            (Transfer::Logistic, 0.4),
        ];
        for (t, u) in cases {
            let fd1 = (t.transfer(u + h) - t.transfer(u - h)) / (2.0 * h);
            assert_abs_diff_eq!(t.first_derivative(u), fd1, epsilon = 1e-6);
            let fd2 = (t.first_derivative(u + h) - t.first_derivative(u - h)) / (2.0 * h);
            assert_abs_diff_eq!(t.second_derivative(u), fd2, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_all_transfers_are_nondecreasing() {
        // Bracket construction in the implicit solver relies on this.
        for t in [
            Transfer::Identity,
            Transfer::Exp,
            Transfer::Logistic,
        ] {
            assert!(t.transfer(-1.0) <= t.transfer(0.5));
        }
        // Inverse is increasing on each side of zero.
        assert!(Transfer::Inverse.transfer(-2.0) < Transfer::Inverse.transfer(-1.0));
        assert!(Transfer::Inverse.transfer(1.0) < Transfer::Inverse.transfer(2.0));
    }

    #[test]
    fn test_vector_transfer_agrees_with_scalar() {
        let t = Transfer::Logistic;
        let u = array![-1.0, 0.0, 2.5];
        let v = t.transfer_vec(&u);
        for (ui, vi) in u.iter().zip(v.iter()) {
            assert_abs_diff_eq!(t.transfer(*ui), *vi);
        }
    }
}
