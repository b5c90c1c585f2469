//! Augmented Lagrangian method for constrained optimization.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::constraint::Constraint;
use crate::optimize::bounds::check_length;
use crate::optimize::error::{Cancelled, OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::state::{OptimizationStatus, OptimizerState, check_convergence};
use crate::optimize::traits::Optimizable;

/// Options for [`AugmentedLagrange`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedLagrangeOptions {
    /// Penalty weight every constraint starts with
    pub initial_penalty: f64,
    /// Factor applied to a constraint's penalty when its violation stalls
    pub penalty_growth: f64,
    /// Upper limit on any penalty weight
    pub max_penalty: f64,
    /// A violation must shrink below this fraction of the previous one to
    /// keep its penalty unchanged
    pub violation_reduction: f64,
    /// Largest violation accepted as feasible; also the tolerance on
    /// multiplier changes
    pub constraint_tolerance: f64,
}

impl Default for AugmentedLagrangeOptions {
    fn default() -> Self {
        Self {
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e12,
            violation_reduction: 0.5,
            constraint_tolerance: 1e-6,
        }
    }
}

impl AugmentedLagrangeOptions {
    /// Checks the options.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !(self.initial_penalty > 0.0 && self.initial_penalty <= self.max_penalty) {
            return Err(OptimizeError::invalid_parameter(
                "initial_penalty",
                "must be positive and at most max_penalty",
            ));
        }
        if !(self.penalty_growth > 1.0) {
            return Err(OptimizeError::invalid_parameter(
                "penalty_growth",
                format!("must exceed 1, got {}", self.penalty_growth),
            ));
        }
        if !(self.violation_reduction > 0.0 && self.violation_reduction < 1.0) {
            return Err(OptimizeError::invalid_parameter(
                "violation_reduction",
                format!("must lie in (0, 1), got {}", self.violation_reduction),
            ));
        }
        if !(self.constraint_tolerance > 0.0) {
            return Err(OptimizeError::invalid_parameter(
                "constraint_tolerance",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Penalty term of one constraint with residual `g`, multiplier `lambda`
/// and weight `mu`.
///
/// Equalities use `λg + (μ/2)g²`. Inequalities use the
/// Powell-Hestenes-Rockafellar form `(max(0, λ + μg)² - λ²) / (2μ)`, which is
/// smooth and vanishes deep inside the feasible region.
fn penalty(equality: bool, g: f64, lambda: f64, mu: f64) -> f64 {
    if equality {
        lambda * g + 0.5 * mu * g * g
    } else {
        let shifted = (lambda + mu * g).max(0.0);
        (shifted * shifted - lambda * lambda) / (2.0 * mu)
    }
}

/// First-order multiplier update.
fn updated_multiplier(equality: bool, g: f64, lambda: f64, mu: f64) -> f64 {
    if equality {
        lambda + mu * g
    } else {
        (lambda + mu * g).max(0.0)
    }
}

/// Augmented Lagrangian wrapper around any optimizer.
///
/// # Note
/// Each outer iteration replaces the inner optimizer's objective by
///
/// `L(x) = f(x) + Σ penalty_i(g_i(x); λ_i, μ_i)`
///
/// and minimizes it, starting from the previous solution. The multipliers
/// `λ` then take a first-order step, and the penalty weight `μ_i` of every
/// constraint whose violation did not fall below `violation_reduction`
/// times its previous value grows by `penalty_growth`.
///
/// The run converges once every violation is within
/// `constraint_tolerance` and no multiplier moved by more than that
/// tolerance (relative and absolute). The best parameter set is the last
/// outer solution with its true objective value, not the lowest objective
/// seen, since infeasible points may score lower.
///
/// The inner optimizer keeps its own bounds, start point and settings, but
/// its evaluations are drawn from this optimizer's budget. They are counted
/// in `function_evaluations` but not traced, since they score `L` rather
/// than `f`; the trace holds one entry per outer solution. It must not carry
/// an analytic gradient of the original objective, since that gradient does
/// not match `L`.
pub struct AugmentedLagrange {
    state: OptimizerState,
    inner: Box<dyn Optimizable>,
    constraints: Vec<Constraint>,
    lambda: Vec<f64>,
    mu: Vec<f64>,
    options: AugmentedLagrangeOptions,
}

impl AugmentedLagrange {
    /// Wraps `inner`, whose current objective becomes the objective of the
    /// constrained problem.
    ///
    /// # Errors
    /// `DimensionMismatch` if a constraint is defined over a different
    /// number of parameters than `inner`.
    pub fn new(inner: Box<dyn Optimizable>, constraints: Vec<Constraint>) -> OptimizeResult<Self> {
        let n = inner.state().number_of_parameters();
        for constraint in &constraints {
            check_length(
                n,
                constraint.number_of_parameters(),
                "AugmentedLagrange",
                "constraint parameters",
            )?;
        }

        let objective = Rc::clone(inner.state().objective());
        let state = OptimizerState::new(objective, n, "AugmentedLagrange")?;
        let m = constraints.len();
        let options = AugmentedLagrangeOptions::default();
        Ok(Self {
            state,
            inner,
            constraints,
            lambda: vec![0.0; m],
            mu: vec![options.initial_penalty; m],
            options,
        })
    }

    /// Replaces the penalty options.
    #[must_use]
    pub fn with_options(mut self, options: AugmentedLagrangeOptions) -> Self {
        self.mu = vec![options.initial_penalty; self.constraints.len()];
        self.options = options;
        self
    }

    /// Lagrange multipliers after the last run, one per constraint.
    #[must_use]
    pub fn lambda(&self) -> &[f64] {
        &self.lambda
    }

    /// Penalty weights after the last run, one per constraint.
    #[must_use]
    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    /// The constraints.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Largest violation at `x` over all constraints.
    #[must_use]
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        self.constraints
            .iter()
            .map(|c| c.violation(x))
            .fold(0.0, f64::max)
    }
}

impl Optimizable for AugmentedLagrange {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn warm_start(&mut self, values: &[f64]) {
        self.inner.warm_start(values);
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        self.options.validate()?;
        let options = &self.options;
        let constraints = &self.constraints;
        let state = &mut self.state;
        let inner = &mut self.inner;
        let m = constraints.len();

        let objective = Rc::clone(state.objective());
        let sign = state.sign();
        self.lambda = vec![0.0; m];
        self.mu = vec![options.initial_penalty; m];
        let mut previous_violation = vec![f64::INFINITY; m];
        let mut previous_solution: Option<Vec<f64>> = None;

        while state.next_iteration() {
            let f = Rc::clone(&objective);
            let penalized_constraints = constraints.clone();
            let lambda = self.lambda.clone();
            let mu = self.mu.clone();
            inner.state_mut().set_objective(Rc::new(move |x: &[f64]| {
                let mut value = sign * f(x);
                for (i, constraint) in penalized_constraints.iter().enumerate() {
                    let g = constraint.residual(x);
                    value += penalty(constraint.is_equality(), g, lambda[i], mu[i]);
                }
                value
            }));

            if let Some(solution) = &previous_solution {
                inner.warm_start(solution);
            }
            // One evaluation stays reserved for scoring the inner solution.
            inner.settings_mut().max_function_evaluations =
                state.remaining_evaluations().saturating_sub(1);

            let inner_status = inner.minimize()?;
            state.add_evaluations(inner.function_evaluations());
            let Some(solution) = inner.best_parameter_set().map(|best| best.values.clone())
            else {
                return Err(Cancelled.into());
            };

            let fitness = state.evaluate(&solution)?;
            state.replace_best(ParameterSet::new(&solution, fitness));
            if inner_status == OptimizationStatus::MaximumFunctionEvaluationsReached {
                return Err(Cancelled.into());
            }

            let mut feasible = true;
            let mut steady = true;
            for (i, constraint) in constraints.iter().enumerate() {
                let g = constraint.residual(&solution);
                let violation = constraint.violation(&solution);
                let lambda =
                    updated_multiplier(constraint.is_equality(), g, self.lambda[i], self.mu[i]);

                feasible &= violation <= options.constraint_tolerance;
                steady &= check_convergence(
                    self.lambda[i],
                    lambda,
                    options.constraint_tolerance,
                    options.constraint_tolerance,
                );
                self.lambda[i] = lambda;

                if violation > options.violation_reduction * previous_violation[i] {
                    self.mu[i] = (self.mu[i] * options.penalty_growth).min(options.max_penalty);
                }
                previous_violation[i] = violation;
            }

            tracing::debug!(
                iteration = state.iterations(),
                fitness,
                lambda = ?self.lambda,
                mu = ?self.mu,
                "augmented Lagrangian step"
            );

            if feasible && steady {
                return Ok(OptimizationStatus::Success);
            }
            previous_solution = Some(solution);
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::constrained::ConstraintType;
    use crate::optimize::minimize::{Bfgs, NelderMead};
    use approx::assert_abs_diff_eq;

    fn distance_to_two_three(x: &[f64]) -> f64 {
        (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2)
    }

    fn sum(x: &[f64]) -> f64 {
        x[0] + x[1]
    }

    fn inner_bfgs<F>(f: F) -> Box<dyn Optimizable>
    where
        F: Fn(&[f64]) -> f64 + 'static,
    {
        Box::new(Bfgs::new(f, 2, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0]).unwrap())
    }

    #[test]
    fn test_penalty_terms() {
        assert_eq!(penalty(true, 2.0, 1.0, 4.0), 2.0 + 8.0);
        // inactive inequality with zero multiplier contributes nothing
        assert_eq!(penalty(false, -1.0, 0.0, 10.0), 0.0);
        // violated inequality behaves like a quadratic penalty
        assert_eq!(penalty(false, 1.0, 0.0, 10.0), 5.0);
        assert_eq!(updated_multiplier(false, -1.0, 2.0, 10.0), 0.0);
        assert_eq!(updated_multiplier(true, -1.0, 2.0, 10.0), -8.0);
    }

    #[test]
    fn test_equality_constraint() {
        let constraint = Constraint::new(sum, 2, 1.0, ConstraintType::EqualTo);
        let mut al = AugmentedLagrange::new(inner_bfgs(distance_to_two_three), vec![constraint])
            .unwrap();
        let status = al.minimize().expect("augmented Lagrange failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = al.best_parameter_set().unwrap();
        assert_abs_diff_eq!(best.values[0], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.values[1], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.fitness, 8.0, epsilon = 1e-3);
        assert_abs_diff_eq!(al.lambda()[0], 4.0, epsilon = 1e-3);
        assert!(al.max_violation(&best.values) <= 1e-6);
    }

    #[test]
    fn test_active_inequality() {
        let constraint = Constraint::new(sum, 2, 1.0, ConstraintType::LesserThanOrEqualTo);
        let mut al = AugmentedLagrange::new(inner_bfgs(distance_to_two_three), vec![constraint])
            .unwrap();
        al.minimize().expect("augmented Lagrange failed");

        let best = al.best_parameter_set().unwrap();
        assert_abs_diff_eq!(best.values[0], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.values[1], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(al.lambda()[0], 4.0, epsilon = 1e-3);
    }

    #[test]
    fn test_inactive_inequality() {
        let constraint = Constraint::new(sum, 2, 1.0, ConstraintType::GreaterThanOrEqualTo);
        let mut al = AugmentedLagrange::new(inner_bfgs(distance_to_two_three), vec![constraint])
            .unwrap();
        let status = al.minimize().expect("augmented Lagrange failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = al.best_parameter_set().unwrap();
        assert_abs_diff_eq!(best.values[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.values[1], 3.0, epsilon = 1e-4);
        assert_eq!(al.lambda()[0], 0.0);
    }

    #[test]
    fn test_nelder_mead_inner() {
        let objective = |x: &[f64]| x[0] * x[0] + x[1] * x[1];
        let mut inner =
            NelderMead::new(objective, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        inner.settings_mut().relative_tolerance = 1e-14;
        inner.settings_mut().absolute_tolerance = 1e-14;
        let constraint = Constraint::new(sum, 2, 2.0, ConstraintType::GreaterThanOrEqualTo);
        let mut al = AugmentedLagrange::new(Box::new(inner), vec![constraint])
            .unwrap()
            .with_options(AugmentedLagrangeOptions {
                constraint_tolerance: 1e-4,
                ..Default::default()
            });
        al.settings_mut().max_iterations = 50;
        al.minimize().expect("augmented Lagrange failed");

        let best = al.best_parameter_set().unwrap();
        assert_abs_diff_eq!(best.values[0], 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(best.values[1], 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(al.lambda()[0], 2.0, epsilon = 5e-2);
    }

    #[test]
    fn test_maximize_with_constraint() {
        let objective = |x: &[f64]| -(x[0] - 2.0).powi(2) - (x[1] - 3.0).powi(2);
        let constraint = Constraint::new(sum, 2, 1.0, ConstraintType::EqualTo);
        let mut al = AugmentedLagrange::new(inner_bfgs(objective), vec![constraint]).unwrap();
        al.maximize().expect("augmented Lagrange failed");

        let best = al.best_parameter_set().unwrap();
        assert_abs_diff_eq!(best.values[0], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.values[1], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.fitness, -8.0, epsilon = 1e-3);
    }

    #[test]
    fn test_trace_holds_outer_solutions() {
        let constraint = Constraint::new(sum, 2, 1.0, ConstraintType::EqualTo);
        let mut al = AugmentedLagrange::new(inner_bfgs(distance_to_two_three), vec![constraint])
            .unwrap();
        al.settings_mut().record_traces = true;
        al.minimize().expect("augmented Lagrange failed");

        let trace = al.parameter_set_trace();
        assert_eq!(trace.len(), al.iterations());
        assert!(trace.len() < al.function_evaluations());
        assert_eq!(trace.last(), al.best_parameter_set());
    }

    #[test]
    fn test_budget_is_shared() {
        let constraint = Constraint::new(sum, 2, 1.0, ConstraintType::EqualTo);
        let mut al = AugmentedLagrange::new(inner_bfgs(distance_to_two_three), vec![constraint])
            .unwrap();
        al.settings_mut().max_function_evaluations = 40;
        let status = al.minimize().expect("augmented Lagrange failed");

        assert_eq!(status, OptimizationStatus::MaximumFunctionEvaluationsReached);
        assert!(al.function_evaluations() <= 40);
        assert!(al.best_parameter_set().is_some());
    }

    #[test]
    fn test_rejects_mismatched_constraint() {
        let constraint = Constraint::new(|x: &[f64]| x[0], 3, 0.0, ConstraintType::EqualTo);
        assert!(matches!(
            AugmentedLagrange::new(inner_bfgs(distance_to_two_three), vec![constraint]),
            Err(OptimizeError::DimensionMismatch { .. })
        ));
    }
}
