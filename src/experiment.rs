// =============================================================================
// Experiment
// =============================================================================
//
// An experiment bundles everything one SGD run needs that is not the data:
//
//   - the model: either a (family, transfer) pair resolved from a model
//     name, or a user-supplied gradient for estimating-equation models;
//   - the learning-rate schedule, built from a schedule name and its
//     numeric hyperparameters;
//   - the reporting knobs (trace/deviance/convergence toggles, epsilon).
//
// Construction is all-or-nothing: unknown model, transfer, or schedule
// names, missing attributes, and bad hyperparameters all fail fast with a
// configuration error, and nothing partially built escapes.
//
// After construction the experiment is immutable except for the schedule's
// internal accumulator, which `learning_rate` advances. One training loop
// drives one experiment; `&mut self` on that method is the only
// synchronization the sequential update model needs.
//
// =============================================================================

use std::fmt;
use std::sync::Arc;

use ndarray::Array1;

use crate::data::DataPoint;
use crate::error::{Result, SgdError};
use crate::families::Family;
use crate::learning_rate::{DdimRate, GradFn, LearnRate, OneDimEigenRate, OneDimRate, StepSize};
use crate::transfers::Transfer;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for an experiment, resolved into typed strategy objects at
/// construction time.
///
/// The numeric learning-rate knobs default to 1.0 and epsilon to 1e-8; the
/// string names have no default because silently picking a model would hide
/// configuration mistakes.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Model name: "gaussian", "poisson", "binomial", or "gamma" for GLMs.
    pub model_name: String,

    /// Dimensionality of the parameter vector. Must be >= 1.
    pub d: usize,

    /// Transfer function name; required for GLM models.
    pub transfer_name: Option<String>,

    /// Rank-check attribute carried from the model attribute bag; required
    /// for GLM models. Queryable by reporting collaborators.
    pub rank: Option<bool>,

    /// Learning-rate schedule name: "one-dim", "one-dim-eigen", or "d-dim".
    pub lr_name: String,

    /// Schedule hyperparameters (interpretation depends on the schedule).
    pub gamma: f64,
    pub alpha: f64,
    pub c: f64,
    pub scale: f64,

    /// Convergence tolerance for the implicit solver's residual.
    pub epsilon: f64,

    /// Reporting toggles.
    pub trace: bool,
    pub deviance: bool,
    pub convergence: bool,
}

impl ExperimentConfig {
    /// A configuration with the given model and dimensionality and sensible
    /// defaults everywhere else (one-dim schedule, unit hyperparameters).
    pub fn new(model_name: impl Into<String>, d: usize) -> Self {
        Self {
            model_name: model_name.into(),
            d,
            transfer_name: None,
            rank: None,
            lr_name: "one-dim".to_string(),
            gamma: 1.0,
            alpha: 1.0,
            c: 1.0,
            scale: 1.0,
            epsilon: 1e-8,
            trace: false,
            deviance: false,
            convergence: false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.d == 0 {
            return Err(SgdError::Configuration(
                "dimensionality d must be >= 1".to_string(),
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SgdError::Configuration(format!(
                "epsilon must be a positive finite number, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

// =============================================================================
// GLM Model
// =============================================================================

/// A resolved family/transfer pair. Stateless and cheap to copy, which is
/// what lets the gradient capability handed to adaptive schedules capture
/// the model by value instead of borrowing the experiment.
#[derive(Debug, Clone, Copy)]
pub struct GlmModel {
    family: Family,
    transfer: Transfer,
    rank: bool,
}

impl GlmModel {
    /// Per-observation gradient: (y - h(x'theta + offset)) * x.
    pub fn gradient(&self, theta: &Array1<f64>, datapoint: &DataPoint, offset: f64) -> Array1<f64> {
        let eta = datapoint.x.dot(theta) + offset;
        (datapoint.y - self.transfer.transfer(eta)) * &datapoint.x
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    pub fn rank(&self) -> bool {
        self.rank
    }
}

/// What the experiment is fitting: a GLM, or an estimating-equation model
/// that only knows how to evaluate its gradient.
enum Model {
    Glm(GlmModel),
    EstimatingEquation(GradFn),
}

// Manual impl: the estimating-equation variant holds a closure, which has
// no Debug of its own.
impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Glm(m) => f.debug_tuple("Glm").field(m).finish(),
            Model::EstimatingEquation(_) => f.write_str("EstimatingEquation(..)"),
        }
    }
}

// =============================================================================
// Experiment
// =============================================================================

/// One SGD run's model + schedule + reporting configuration.
pub struct Experiment {
    config: ExperimentConfig,
    model: Model,
    lr: LearnRate,
}

impl Experiment {
    /// Build a GLM experiment from a configuration.
    ///
    /// Resolves the family from the model name and the transfer from the
    /// `transfer_name` attribute; both must be present and known. The
    /// `rank` attribute is likewise required, matching the model attribute
    /// set GLM experiments are constructed from.
    pub fn glm(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let family = Family::from_name(&config.model_name)?;
        let transfer_name = config.transfer_name.as_deref().ok_or_else(|| {
            SgdError::Configuration(format!(
                "model '{}' requires the 'transfer_name' attribute",
                config.model_name
            ))
        })?;
        let transfer = Transfer::from_name(transfer_name)?;
        let rank = config.rank.ok_or_else(|| {
            SgdError::Configuration(format!(
                "model '{}' requires the 'rank' attribute",
                config.model_name
            ))
        })?;

        let model = GlmModel { family, transfer, rank };
        let grad_fn: GradFn =
            Arc::new(move |theta: &Array1<f64>, dp: &DataPoint, offset: f64| {
                model.gradient(theta, dp, offset)
            });
        let lr = build_learning_rate(&config, grad_fn)?;
        Ok(Self { config, model: Model::Glm(model), lr })
    }

    /// Build an estimating-equation experiment around a user-supplied
    /// gradient. Family/transfer pass-throughs degrade to `Unsupported`.
    pub fn estimating_equation(config: ExperimentConfig, gradient: GradFn) -> Result<Self> {
        config.validate()?;
        let lr = build_learning_rate(&config, gradient.clone())?;
        Ok(Self { config, model: Model::EstimatingEquation(gradient), lr })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Dimensionality of the parameter vector.
    pub fn d(&self) -> usize {
        self.config.d
    }

    /// Convergence tolerance used by the implicit solver.
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    /// The bound GLM model, when this experiment has one. The implicit
    /// solver reduces through this to keep its inner loop infallible.
    pub fn glm_model(&self) -> Option<&GlmModel> {
        match &self.model {
            Model::Glm(m) => Some(m),
            Model::EstimatingEquation(_) => None,
        }
    }

    // -------------------------------------------------------------------------
    // Update-path entry points
    // -------------------------------------------------------------------------

    /// The model gradient at (theta, datapoint, offset). This is the
    /// explicit-SGD direction and the function whose 1-D reduction the
    /// implicit solver roots.
    pub fn gradient(
        &self,
        theta: &Array1<f64>,
        datapoint: &DataPoint,
        offset: f64,
    ) -> Result<Array1<f64>> {
        self.check_dims(theta, datapoint)?;
        Ok(match &self.model {
            Model::Glm(m) => m.gradient(theta, datapoint, offset),
            Model::EstimatingEquation(g) => g(theta, datapoint, offset),
        })
    }

    /// Advance the schedule and produce the step for iteration `t`
    /// (1-based). The only mutating call on an experiment.
    pub fn learning_rate(
        &mut self,
        theta: &Array1<f64>,
        datapoint: &DataPoint,
        offset: f64,
        t: usize,
    ) -> Result<StepSize> {
        self.check_dims(theta, datapoint)?;
        Ok(self.lr.step(theta, datapoint, offset, t, self.config.d))
    }

    /// Restore the schedule's freshly-constructed accumulator state.
    pub fn reset_learning_rate(&mut self) {
        self.lr.reset();
    }

    // -------------------------------------------------------------------------
    // Family/transfer pass-throughs
    // -------------------------------------------------------------------------
    //
    // These keep callers (notably the implicit solver and reporting hooks)
    // generic over the model. Estimating-equation experiments have no
    // family or transfer, so every one of these degrades to Unsupported
    // for that variant.
    // -------------------------------------------------------------------------

    pub fn h_transfer(&self, u: f64) -> Result<f64> {
        Ok(self.require_glm("h_transfer")?.transfer().transfer(u))
    }

    /// Elementwise transfer; agrees pointwise with `h_transfer`.
    pub fn h_transfer_vec(&self, u: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.require_glm("h_transfer")?.transfer().transfer_vec(u))
    }

    pub fn g_link(&self, mean: f64) -> Result<f64> {
        Ok(self.require_glm("g_link")?.transfer().link(mean))
    }

    pub fn h_first_derivative(&self, u: f64) -> Result<f64> {
        Ok(self.require_glm("h_first_derivative")?.transfer().first_derivative(u))
    }

    pub fn h_second_derivative(&self, u: f64) -> Result<f64> {
        Ok(self.require_glm("h_second_derivative")?.transfer().second_derivative(u))
    }

    pub fn valideta(&self, eta: f64) -> Result<bool> {
        Ok(self.require_glm("valideta")?.transfer().valideta(eta))
    }

    pub fn variance(&self, mu: f64) -> Result<f64> {
        Ok(self.require_glm("variance")?.family().variance(mu))
    }

    /// Reporting hook: weighted deviance of fitted means against responses.
    /// Callable after every update.
    pub fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>, wt: &Array1<f64>) -> Result<f64> {
        Ok(self.require_glm("deviance")?.family().deviance(y, mu, wt))
    }

    fn require_glm(&self, op: &str) -> Result<&GlmModel> {
        self.glm_model().ok_or_else(|| {
            SgdError::Unsupported(format!(
                "{} is not available for estimating-equation experiments",
                op
            ))
        })
    }

    fn check_dims(&self, theta: &Array1<f64>, datapoint: &DataPoint) -> Result<()> {
        if theta.len() != self.config.d || datapoint.x.len() != self.config.d {
            return Err(SgdError::Configuration(format!(
                "dimension mismatch: experiment has d = {}, theta has {} and x has {}",
                self.config.d,
                theta.len(),
                datapoint.x.len()
            )));
        }
        Ok(())
    }
}

/// Resolve the schedule name into a schedule instance, handing the adaptive
/// variants their gradient capability.
fn build_learning_rate(config: &ExperimentConfig, grad_fn: GradFn) -> Result<LearnRate> {
    match config.lr_name.to_lowercase().as_str() {
        "one-dim" => Ok(LearnRate::OneDim(OneDimRate::new(
            config.gamma,
            config.alpha,
            config.c,
            config.scale,
        )?)),
        "one-dim-eigen" => Ok(LearnRate::OneDimEigen(OneDimEigenRate::new(grad_fn))),
        "d-dim" => Ok(LearnRate::Ddim(DdimRate::new(
            config.d,
            config.alpha,
            config.c,
            grad_fn,
        )?)),
        _ => Err(SgdError::Configuration(format!(
            "Unknown learning rate '{}'. Use 'one-dim', 'one-dim-eigen', or 'd-dim'.",
            config.lr_name
        ))),
    }
}

// =============================================================================
// Configuration Summary (reporting hook)
// =============================================================================

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("config", &self.config)
            .field("model", &self.model)
            .field("learning_rate", &self.lr.name())
            .finish()
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |b: bool| if b { "On" } else { "Off" };
        writeln!(f, "Experiment:")?;
        match &self.model {
            Model::Glm(m) => {
                // Print the resolved family, not the raw configuration
                // string.
                writeln!(f, "  Model: {}", m.family().name())?;
                writeln!(f, "  Transfer function: {}", m.transfer().name())?;
            }
            Model::EstimatingEquation(_) => {
                writeln!(f, "  Model: {}", self.config.model_name)?;
            }
        }
        writeln!(f, "  Learning rate: {}", self.lr.name())?;
        writeln!(f, "  Trace: {}", on_off(self.config.trace))?;
        writeln!(f, "  Deviance: {}", on_off(self.config.deviance))?;
        writeln!(f, "  Convergence: {}", on_off(self.config.convergence))?;
        write!(f, "  Epsilon: {}", self.config.epsilon)
    }
}

// =============================================================================
// Tests
// =============================================================================
