//! Golden section search.

use std::rc::Rc;

use super::GOLDEN_SECTION;
use crate::optimize::bounds::Bounds;
use crate::optimize::error::OptimizeResult;
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Golden section search for a one-dimensional objective on `[lower, upper]`.
///
/// # Note
/// Golden section search is robust and doesn't require derivatives.
/// It has linear convergence (the interval shrinks by 0.618 per evaluation)
/// and works well for unimodal functions.
pub struct GoldenSection {
    state: OptimizerState,
    bounds: Bounds,
}

impl GoldenSection {
    /// Creates a golden section search of `objective` over `[lower, upper]`.
    ///
    /// # Errors
    /// `InvalidInterval` if `lower >= upper` or an endpoint is not finite.
    pub fn new<F>(objective: F, lower: f64, upper: f64) -> OptimizeResult<Self>
    where
        F: Fn(f64) -> f64 + 'static,
    {
        let bounds = Bounds::new(1, &[lower], &[upper], "GoldenSection")?;
        let state = OptimizerState::new(
            Rc::new(move |x: &[f64]| objective(x[0])),
            1,
            "GoldenSection",
        )?;
        Ok(Self { state, bounds })
    }
}

impl Optimizable for GoldenSection {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        let mut a = self.bounds.lower()[0];
        let mut b = self.bounds.upper()[0];
        let state = &mut self.state;

        // Initial interior points
        let mut x1 = a + GOLDEN_SECTION * (b - a);
        let mut x2 = b - GOLDEN_SECTION * (b - a);
        let mut f1 = state.evaluate(&[x1])?;
        let mut f2 = state.evaluate(&[x2])?;

        while state.next_iteration() {
            let settings = state.settings();
            let tolerance =
                settings.absolute_tolerance + settings.relative_tolerance * (x1.abs() + x2.abs());
            if (b - a).abs() <= tolerance {
                tracing::debug!(a, b, iterations = state.iterations(), "golden section converged");
                return Ok(OptimizationStatus::Success);
            }

            // Narrow the bracket
            if f1 < f2 {
                // Minimum is in [a, x2]
                b = x2;
                x2 = x1;
                f2 = f1;
                x1 = a + GOLDEN_SECTION * (b - a);
                f1 = state.evaluate(&[x1])?;
            } else {
                // Minimum is in [x1, b]
                a = x1;
                x1 = x2;
                f1 = f2;
                x2 = b - GOLDEN_SECTION * (b - a);
                f2 = state.evaluate(&[x2])?;
            }
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_simple_quadratic() {
        let mut golden = GoldenSection::new(|x| (x - 2.0) * (x - 2.0), 0.0, 4.0).unwrap();
        let status = golden.minimize().expect("golden section failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = golden.best_parameter_set().unwrap();
        assert!((best.values[0] - 2.0).abs() < 1e-6);
        assert!(best.fitness < 1e-10);
    }

    #[test]
    fn test_golden_sine() {
        let mut golden =
            GoldenSection::new(|x: f64| x.sin(), 0.0, 2.0 * std::f64::consts::PI).unwrap();
        golden.minimize().expect("golden section failed");

        let best = golden.best_parameter_set().unwrap();
        let expected_x = 3.0 * std::f64::consts::PI / 2.0;
        assert!((best.values[0] - expected_x).abs() < 1e-5);
        assert!((best.fitness - (-1.0)).abs() < 1e-10);
    }

    #[test]
    fn test_golden_maximize_cubic() {
        let mut golden =
            GoldenSection::new(|x| (x + 3.0) * (x - 1.0) * (x - 1.0), -3.0, 1.0).unwrap();
        golden.maximize().expect("golden section failed");

        let best = golden.best_parameter_set().unwrap();
        assert!((best.values[0] + 5.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_golden_invalid_interval() {
        let result = GoldenSection::new(|x| x * x, 4.0, 2.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_golden_budget() {
        let mut golden = GoldenSection::new(|x| x * x, -1.0, 3.0).unwrap();
        golden.settings_mut().max_function_evaluations = 10;
        let status = golden.minimize().unwrap();

        assert_eq!(status, OptimizationStatus::MaximumFunctionEvaluationsReached);
        assert_eq!(golden.function_evaluations(), 10);
    }
}
