//! The optimizer contract and the shared minimize/maximize driver.

use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::state::{OptimizationStatus, OptimizerSettings, OptimizerState, Sense};

/// Common interface of every optimizer in this crate.
///
/// Implementors provide access to their [`OptimizerState`] and the
/// algorithm itself in [`optimize`](Optimizable::optimize). Callers use
/// [`minimize`](Optimizable::minimize) or [`maximize`](Optimizable::maximize),
/// which reset the counters, apply the sign convention, run the algorithm
/// and translate budget exhaustion into a status.
///
/// # Example
///
/// ```ignore
/// use numerics::optimize::{NelderMead, Optimizable};
///
/// let booth = |x: &[f64]| (x[0] + 2.0 * x[1] - 7.0).powi(2) + (2.0 * x[0] + x[1] - 5.0).powi(2);
/// let mut solver = NelderMead::new(booth, 2, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0])?;
/// solver.minimize()?;
/// let best = solver.best_parameter_set().unwrap();
/// ```
pub trait Optimizable {
    /// Shared optimizer state.
    fn state(&self) -> &OptimizerState;

    /// Mutable shared optimizer state.
    fn state_mut(&mut self) -> &mut OptimizerState;

    /// Runs the algorithm, always minimizing through
    /// [`OptimizerState::evaluate`].
    ///
    /// Returns the terminal status on normal completion. Budget exhaustion
    /// propagates as [`OptimizeError::Cancelled`].
    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus>;

    /// Moves the starting point of a local method. Global methods ignore it.
    fn warm_start(&mut self, _values: &[f64]) {}

    /// Minimizes the objective.
    ///
    /// # Errors
    /// Configuration errors from option validation, or a numerical failure
    /// raised by the algorithm. Budget exhaustion is not an error.
    fn minimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        solve(self, Sense::Minimize)
    }

    /// Maximizes the objective.
    ///
    /// # Errors
    /// Same as [`minimize`](Optimizable::minimize).
    fn maximize(&mut self) -> OptimizeResult<OptimizationStatus> {
        solve(self, Sense::Maximize)
    }

    /// Best parameter set, with fitness in the caller's sign convention.
    fn best_parameter_set(&self) -> Option<&ParameterSet> {
        self.state().best_parameter_set()
    }

    /// Run status.
    fn status(&self) -> OptimizationStatus {
        self.state().status()
    }

    /// Iterations completed by the last run.
    fn iterations(&self) -> usize {
        self.state().iterations()
    }

    /// Objective evaluations performed by the last run.
    fn function_evaluations(&self) -> usize {
        self.state().function_evaluations()
    }

    /// Every evaluated parameter set, when tracing is enabled.
    fn parameter_set_trace(&self) -> &[ParameterSet] {
        self.state().parameter_set_trace()
    }

    /// Finite-difference Hessian at the optimum, when requested.
    fn hessian(&self) -> Option<&[Vec<f64>]> {
        self.state().hessian()
    }

    /// Budgets and tolerances.
    fn settings(&self) -> &OptimizerSettings {
        self.state().settings()
    }

    /// Mutable budgets and tolerances.
    fn settings_mut(&mut self) -> &mut OptimizerSettings {
        self.state_mut().settings_mut()
    }
}

fn solve<O>(optimizer: &mut O, sense: Sense) -> OptimizeResult<OptimizationStatus>
where
    O: Optimizable + ?Sized,
{
    optimizer.settings().validate()?;
    optimizer.state_mut().reset(sense);

    tracing::debug!(
        sense = ?sense,
        parameters = optimizer.state().number_of_parameters(),
        "optimization started"
    );

    let outcome = run(optimizer);
    optimizer.state_mut().finish();
    let status = outcome?;

    let state = optimizer.state();
    match status {
        OptimizationStatus::Success => tracing::info!(
            iterations = state.iterations(),
            function_evaluations = state.function_evaluations(),
            fitness = state.best_parameter_set().map(|best| best.fitness),
            "optimization converged"
        ),
        _ => tracing::warn!(
            status = ?status,
            iterations = state.iterations(),
            function_evaluations = state.function_evaluations(),
            "optimization stopped before convergence"
        ),
    }

    Ok(status)
}

/// Runs `optimize` and records its terminal status.
///
/// Used directly for nested local searches, which stay in the parent's
/// internal sign convention and skip reset/finish.
pub(crate) fn run<O>(optimizer: &mut O) -> OptimizeResult<OptimizationStatus>
where
    O: Optimizable + ?Sized,
{
    match optimizer.optimize() {
        Ok(status) => {
            optimizer.state_mut().update_status(status);
            Ok(status)
        }
        Err(OptimizeError::Cancelled(_)) => {
            let status = OptimizationStatus::MaximumFunctionEvaluationsReached;
            optimizer.state_mut().update_status(status);
            Ok(status)
        }
        Err(err) => {
            tracing::warn!(error = %err, "optimization failed");
            optimizer
                .state_mut()
                .update_status(OptimizationStatus::Failure);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    /// Walks x = 0, 1, 2, ... and reports success at a fixed point.
    struct Counter {
        state: OptimizerState,
        stop_at: usize,
        fail: bool,
    }

    impl Counter {
        fn new(stop_at: usize) -> Self {
            let objective = Rc::new(|x: &[f64]| (x[0] - 3.0).powi(2));
            Self {
                state: OptimizerState::new(objective, 1, "counter").unwrap(),
                stop_at,
                fail: false,
            }
        }
    }

    impl Optimizable for Counter {
        fn state(&self) -> &OptimizerState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut OptimizerState {
            &mut self.state
        }

        fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
            while self.state.next_iteration() {
                let k = self.state.iterations();
                self.state.evaluate(&[k as f64])?;
                if self.fail {
                    return Err(OptimizeError::numerical("degenerate step"));
                }
                if k == self.stop_at {
                    return Ok(OptimizationStatus::Success);
                }
            }
            Ok(OptimizationStatus::MaximumIterationsReached)
        }
    }

    #[test]
    fn test_minimize_reports_success() {
        let mut counter = Counter::new(5);
        let status = counter.minimize().expect("minimize failed");

        assert_eq!(status, OptimizationStatus::Success);
        assert_eq!(counter.status(), OptimizationStatus::Success);
        assert_eq!(counter.function_evaluations(), 5);
        assert_eq!(counter.best_parameter_set().unwrap().values, vec![3.0]);
    }

    #[test]
    fn test_budget_exhaustion_is_not_an_error() {
        let mut counter = Counter::new(50);
        counter.settings_mut().max_function_evaluations = 2;
        let status = counter.minimize().expect("minimize failed");

        assert_eq!(status, OptimizationStatus::MaximumFunctionEvaluationsReached);
        assert_eq!(counter.function_evaluations(), 2);
        assert_eq!(counter.best_parameter_set().unwrap().values, vec![2.0]);
    }

    #[test]
    fn test_iteration_budget() {
        let mut counter = Counter::new(50);
        counter.settings_mut().max_iterations = 4;
        let status = counter.minimize().expect("minimize failed");

        assert_eq!(status, OptimizationStatus::MaximumIterationsReached);
        assert_eq!(counter.iterations(), 4);
    }

    #[test]
    fn test_numerical_failure_keeps_best() {
        let mut counter = Counter::new(50);
        counter.fail = true;
        let result = counter.minimize();

        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert_eq!(counter.status(), OptimizationStatus::Failure);
        assert!(counter.best_parameter_set().is_some());
    }

    #[test]
    fn test_maximize_reports_original_sign() {
        let mut counter = Counter::new(3);
        counter.maximize().expect("maximize failed");

        // Maximum of (x - 3)^2 over x = 1, 2, 3 is at x = 1.
        let best = counter.best_parameter_set().unwrap();
        assert_eq!(best.values, vec![1.0]);
        assert_eq!(best.fitness, 4.0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut counter = Counter::new(3);
        counter.settings_mut().relative_tolerance = -1.0;
        assert!(matches!(
            counter.minimize(),
            Err(OptimizeError::InvalidParameter { .. })
        ));
        assert_eq!(counter.function_evaluations(), 0);
    }

    #[test]
    fn test_trait_object_dispatch() {
        let mut boxed: Box<dyn Optimizable> = Box::new(Counter::new(2));
        assert_eq!(boxed.minimize().unwrap(), OptimizationStatus::Success);
        assert_eq!(boxed.iterations(), 2);
    }
}
