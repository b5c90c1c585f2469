//! BFGS quasi-Newton method for minimization.

#![allow(clippy::needless_range_loop)]

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{gradient_at, local_problem};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::state::{Gradient, OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;
use crate::optimize::utils::{dot, identity, mat_vec, norm, vec_sub};

/// Line-search settings for [`Bfgs`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BfgsOptions {
    /// Maximum line-search step, scaled by `max(|x|, n)`
    pub max_step: f64,
    /// Sufficient-decrease (Armijo) constant
    pub sufficient_decrease: f64,
}

impl Default for BfgsOptions {
    fn default() -> Self {
        Self {
            max_step: 100.0,
            sufficient_decrease: 1e-4,
        }
    }
}

impl BfgsOptions {
    /// Checks the line-search settings.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending setting.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !(self.max_step > 0.0 && self.max_step.is_finite()) {
            return Err(OptimizeError::invalid_parameter(
                "max_step",
                "must be positive and finite",
            ));
        }
        if !(self.sufficient_decrease > 0.0 && self.sufficient_decrease < 0.5) {
            return Err(OptimizeError::invalid_parameter(
                "sufficient_decrease",
                "must lie in (0, 0.5)",
            ));
        }
        Ok(())
    }
}

/// BFGS quasi-Newton method for minimization.
///
/// # Note
/// BFGS maintains an approximation of the inverse Hessian, starting from the
/// identity, and searches along `-H∇f` with a cubic/quadratic backtracking
/// line search. It has superlinear convergence near the minimum. Without a
/// caller-supplied gradient, central differences that stay inside the bounds
/// are used and their evaluations count against the budget.
///
/// Stops when the relative step falls below `relative_tolerance` or the
/// scaled gradient falls below `absolute_tolerance`.
pub struct Bfgs {
    state: OptimizerState,
    bounds: Bounds,
    initial_values: Vec<f64>,
    gradient: Option<Gradient>,
    options: BfgsOptions,
}

impl Bfgs {
    /// Creates a BFGS search starting from `initial_values`.
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
            "Bfgs",
        )?;
        Ok(Self::from_state(state, bounds, initial_values.to_vec()))
    }

    pub(crate) fn from_state(
        state: OptimizerState,
        bounds: Bounds,
        initial_values: Vec<f64>,
    ) -> Self {
        Self {
            state,
            bounds,
            initial_values,
            gradient: None,
            options: BfgsOptions::default(),
        }
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

    /// Replaces the line-search settings.
    #[must_use]
    pub fn with_options(mut self, options: BfgsOptions) -> Self {
        self.options = options;
        self
    }

    /// Starting point.
    #[must_use]
    pub fn initial_values(&self) -> &[f64] {
        &self.initial_values
    }
}

/// Outcome of one backtracking line search.
struct LineStep {
    x: Vec<f64>,
    fx: f64,
    /// The step shrank below the resolvable minimum; `x` is the old point
    stalled: bool,
}

/// Backtracking line search along `direction` from `x_old`.
///
/// Takes the full step first, then backtracks with a quadratic model on the
/// first retry and a cubic model afterwards, until the Armijo condition
/// `f(x) <= f_old + c * lambda * slope` holds.
///
/// # Errors
/// `NumericalError` if `direction` is not a descent direction.
#[allow(clippy::too_many_arguments)]
fn line_search(
    state: &mut OptimizerState,
    bounds: &Bounds,
    options: &BfgsOptions,
    x_old: &[f64],
    f_old: f64,
    gradient: &[f64],
    direction: &mut [f64],
    max_step: f64,
) -> OptimizeResult<LineStep> {
    let step_norm = norm(direction);
    if step_norm > max_step {
        for d in direction.iter_mut() {
            *d *= max_step / step_norm;
        }
    }

    let slope = dot(gradient, direction);
    if !(slope < 0.0) {
        return Err(OptimizeError::numerical(
            "bfgs: roundoff problem in line search (non-negative slope)",
        ));
    }

    let relative_step = direction
        .iter()
        .zip(x_old.iter())
        .map(|(d, x)| d.abs() / x.abs().max(1.0))
        .fold(0.0, f64::max);
    let min_lambda = state.settings().relative_tolerance / relative_step;

    let mut lambda: f64 = 1.0;
    let mut lambda_prev = 0.0;
    let mut f_prev = 0.0;

    loop {
        let mut x: Vec<f64> = x_old
            .iter()
            .zip(direction.iter())
            .map(|(xo, d)| xo + lambda * d)
            .collect();
        bounds.repair(&mut x);
        let fx = state.evaluate(&x)?;

        if lambda < min_lambda {
            return Ok(LineStep {
                x: x_old.to_vec(),
                fx: f_old,
                stalled: true,
            });
        }
        if fx <= f_old + options.sufficient_decrease * lambda * slope {
            return Ok(LineStep {
                x,
                fx,
                stalled: false,
            });
        }

        let next = if lambda == 1.0 {
            -slope / (2.0 * (fx - f_old - slope))
        } else {
            let rhs1 = fx - f_old - lambda * slope;
            let rhs2 = f_prev - f_old - lambda_prev * slope;
            let a = (rhs1 / (lambda * lambda) - rhs2 / (lambda_prev * lambda_prev))
                / (lambda - lambda_prev);
            let b = (-lambda_prev * rhs1 / (lambda * lambda)
                + lambda * rhs2 / (lambda_prev * lambda_prev))
                / (lambda - lambda_prev);
            let candidate = if a == 0.0 {
                -slope / (2.0 * b)
            } else {
                let disc = b * b - 3.0 * a * slope;
                if disc < 0.0 {
                    0.5 * lambda
                } else if b <= 0.0 {
                    (-b + disc.sqrt()) / (3.0 * a)
                } else {
                    -slope / (b + disc.sqrt())
                }
            };
            candidate.min(0.5 * lambda)
        };

        lambda_prev = lambda;
        f_prev = fx;
        // f64::max drops a NaN candidate
        lambda = next.max(0.1 * lambda);
    }
}

/// Largest gradient component scaled by `max(|x|, 1) / max(|f|, 1)`.
///
/// NaN when any component is NaN, so the test never passes on a broken
/// gradient.
fn scaled_gradient(gradient: &[f64], x: &[f64], fx: f64) -> f64 {
    let scale = fx.abs().max(1.0);
    gradient
        .iter()
        .zip(x.iter())
        .map(|(gi, xi)| gi.abs() * xi.abs().max(1.0) / scale)
        .fold(0.0, |acc: f64, v| if v.is_nan() || v > acc { v } else { acc })
}

impl Optimizable for Bfgs {
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
        let n = self.initial_values.len();
        let bounds = &self.bounds;
        let options = &self.options;
        let user_gradient = self.gradient.as_ref();
        let state = &mut self.state;

        let mut x = self.initial_values.clone();
        let mut fx = state.evaluate(&x)?;
        let mut grad = gradient_at(state, bounds, user_gradient, &x)?;
        if scaled_gradient(&grad, &x, fx) < state.settings().absolute_tolerance {
            return Ok(OptimizationStatus::Success);
        }

        // Initialize inverse Hessian approximation to identity
        let mut h_inv = identity(n);
        let mut direction: Vec<f64> = grad.iter().map(|g| -g).collect();
        let max_step = options.max_step * norm(&x).max(n as f64);

        while state.next_iteration() {
            let step = line_search(
                state,
                bounds,
                options,
                &x,
                fx,
                &grad,
                &mut direction,
                max_step,
            )?;
            if step.stalled {
                tracing::debug!(iterations = state.iterations(), "bfgs line search stalled");
            }

            let s = vec_sub(&step.x, &x);
            x = step.x;
            fx = step.fx;

            // Relative step test
            let step_size = s
                .iter()
                .zip(x.iter())
                .map(|(si, xi)| si.abs() / xi.abs().max(1.0))
                .fold(0.0, f64::max);
            if step_size < state.settings().relative_tolerance {
                return Ok(OptimizationStatus::Success);
            }

            let grad_new = gradient_at(state, bounds, user_gradient, &x)?;

            if scaled_gradient(&grad_new, &x, fx) < state.settings().absolute_tolerance {
                return Ok(OptimizationStatus::Success);
            }

            // BFGS update of the inverse Hessian
            let y = vec_sub(&grad_new, &grad);
            let h_y = mat_vec(&h_inv, &y);
            let ys = dot(&y, &s);
            let yhy = dot(&y, &h_y);
            let sum_y = dot(&y, &y);
            let sum_s = dot(&s, &s);

            // Skip the update when curvature is not safely positive
            if ys > (f64::EPSILON * sum_y * sum_s).sqrt() {
                let rho = 1.0 / ys;
                let inv_yhy = 1.0 / yhy;
                let u: Vec<f64> = (0..n).map(|i| rho * s[i] - inv_yhy * h_y[i]).collect();
                for i in 0..n {
                    for j in 0..n {
                        h_inv[i][j] += rho * s[i] * s[j] - inv_yhy * h_y[i] * h_y[j]
                            + yhy * u[i] * u[j];
                    }
                }
            }

            grad = grad_new;
            direction = mat_vec(&h_inv, &grad).into_iter().map(|d| -d).collect();
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|xi| xi * xi).sum()
    }

    fn rosenbrock(x: &[f64]) -> f64 {
        let a = 1.0;
        let b = 100.0;
        (a - x[0]).powi(2) + b * (x[1] - x[0].powi(2)).powi(2)
    }

    #[test]
    fn test_bfgs_sphere() {
        let mut bfgs = Bfgs::new(sphere, 3, &[1.0, 1.0, 1.0], &[-5.0; 3], &[5.0; 3]).unwrap();
        let status = bfgs.minimize().expect("bfgs failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = bfgs.best_parameter_set().unwrap();
        assert!(best.fitness < 1e-10);
        for xi in &best.values {
            assert!(xi.abs() < 1e-5);
        }
    }

    #[test]
    fn test_bfgs_rosenbrock_with_gradient() {
        let gradient = |x: &[f64]| {
            vec![
                -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]),
                200.0 * (x[1] - x[0] * x[0]),
            ]
        };
        let mut bfgs = Bfgs::new(rosenbrock, 2, &[-1.2, 1.0], &[-5.0, -5.0], &[5.0, 5.0])
            .unwrap()
            .with_gradient(gradient);
        bfgs.minimize().expect("bfgs failed");

        let best = bfgs.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 1e-3);
        assert!((best.values[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_bfgs_maximize_with_gradient() {
        let f = |x: &[f64]| 3.0 - (x[0] - 1.0).powi(2) - 2.0 * (x[1] + 0.5).powi(2);
        let gradient = |x: &[f64]| vec![-2.0 * (x[0] - 1.0), -4.0 * (x[1] + 0.5)];
        let mut bfgs = Bfgs::new(f, 2, &[0.0, 0.0], &[-3.0, -3.0], &[3.0, 3.0])
            .unwrap()
            .with_gradient(gradient);
        bfgs.maximize().expect("bfgs failed");

        let best = bfgs.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 1e-6);
        assert!((best.values[1] + 0.5).abs() < 1e-6);
        assert!((best.fitness - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_bfgs_nan_gradient_fails() {
        let mut bfgs = Bfgs::new(sphere, 2, &[1.0, 1.0], &[-5.0; 2], &[5.0; 2])
            .unwrap()
            .with_gradient(|_: &[f64]| vec![f64::NAN, f64::NAN]);
        let result = bfgs.minimize();

        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert_eq!(bfgs.status(), OptimizationStatus::Failure);
        assert!(bfgs.best_parameter_set().is_some());
    }

    #[test]
    fn test_bfgs_start_at_minimum() {
        let mut bfgs = Bfgs::new(sphere, 2, &[0.0, 0.0], &[-5.0; 2], &[5.0; 2])
            .unwrap()
            .with_gradient(|x: &[f64]| x.iter().map(|xi| 2.0 * xi).collect());
        let status = bfgs.minimize().expect("bfgs failed");

        assert_eq!(status, OptimizationStatus::Success);
        assert_eq!(bfgs.function_evaluations(), 1);
    }
}
