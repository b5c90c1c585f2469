//! ADAM first-order optimizer.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{gradient_at, local_problem};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::state::{Gradient, OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Step-size and decay settings for [`Adam`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamOptions {
    /// Learning rate
    pub alpha: f64,
    /// Decay of the first-moment estimate
    pub beta1: f64,
    /// Decay of the second-moment estimate
    pub beta2: f64,
    /// Denominator offset
    pub epsilon: f64,
}

impl Default for AdamOptions {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdamOptions {
    /// Checks the settings.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending setting.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(OptimizeError::invalid_parameter("alpha", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.beta1) {
            return Err(OptimizeError::invalid_parameter("beta1", "must lie in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.beta2) {
            return Err(OptimizeError::invalid_parameter("beta2", "must lie in [0, 1)"));
        }
        if !(self.epsilon > 0.0) {
            return Err(OptimizeError::invalid_parameter("epsilon", "must be positive"));
        }
        Ok(())
    }
}

/// ADAM: adaptive moment estimation.
///
/// Keeps exponentially decaying averages of the gradient and its square,
/// corrects their start-up bias, and steps each parameter by
/// `alpha * m / (sqrt(v) + epsilon)`. Every step is clamped into the bounds.
/// Stops when successive objective values agree within tolerance.
pub struct Adam {
    state: OptimizerState,
    bounds: Bounds,
    initial_values: Vec<f64>,
    gradient: Option<Gradient>,
    options: AdamOptions,
}

impl Adam {
    /// Creates an ADAM search starting from `initial_values`.
    ///
    /// # Errors
    /// * `DimensionMismatch` if a slice does not have `number_of_parameters` entries
    /// * `InvalidInterval` if any `upper[i] <= lower[i]`
    /// * `InvalidInput` if the start lies outside the bounds
    pub fn new<F>(
        objective: F,
        number_of_parameters: usize,
        initial_values: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> OptimizeResult<Self>
    where
        F: Fn(&[f64]) -> f64 + 'static,
    {
        let (state, bounds) = local_problem(
            objective,
            number_of_parameters,
            initial_values,
            lower,
            upper,
            "Adam",
        )?;
        Ok(Self {
            state,
            bounds,
            initial_values: initial_values.to_vec(),
            gradient: None,
            options: AdamOptions::default(),
        })
    }

    /// Uses an analytic gradient instead of finite differences.
    #[must_use]
    pub fn with_gradient<G>(mut self, gradient: G) -> Self
    where
        G: Fn(&[f64]) -> Vec<f64> + 'static,
    {
        self.gradient = Some(Rc::new(gradient));
        self
    }

    /// Replaces the step-size and decay settings.
    #[must_use]
    pub fn with_options(mut self, options: AdamOptions) -> Self {
        self.options = options;
        self
    }
}

impl Optimizable for Adam {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn warm_start(&mut self, values: &[f64]) {
        let mut start = values.to_vec();
        self.bounds.repair(&mut start);
        self.initial_values = start;
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        self.options.validate()?;
        let AdamOptions {
            alpha,
            beta1,
            beta2,
            epsilon,
        } = self.options;
        let n = self.initial_values.len();
        let bounds = &self.bounds;
        let user_gradient = self.gradient.as_ref();
        let state = &mut self.state;

        let mut x = self.initial_values.clone();
        let mut fx = state.evaluate(&x)?;
        let mut m = vec![0.0; n];
        let mut v = vec![0.0; n];
        let mut beta1_t = 1.0;
        let mut beta2_t = 1.0;

        while state.next_iteration() {
            let g = gradient_at(state, bounds, user_gradient, &x)?;
            beta1_t *= beta1;
            beta2_t *= beta2;

            for i in 0..n {
                m[i] = beta1 * m[i] + (1.0 - beta1) * g[i];
                v[i] = beta2 * v[i] + (1.0 - beta2) * g[i] * g[i];
                let m_hat = m[i] / (1.0 - beta1_t);
                let v_hat = v[i] / (1.0 - beta2_t);
                x[i] = bounds.repair_at(i, x[i] - alpha * m_hat / (v_hat.sqrt() + epsilon));
            }

            let f_new = state.evaluate(&x)?;
            if state.check_convergence(fx, f_new) {
                tracing::debug!(
                    iterations = state.iterations(),
                    fitness = f_new,
                    "adam converged"
                );
                return Ok(OptimizationStatus::Success);
            }
            fx = f_new;
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}
