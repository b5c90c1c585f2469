//! Repeated local searches from random starting points.

use serde::{Deserialize, Serialize};

use super::check_size;
use crate::optimize::bounds::Bounds;
use crate::optimize::error::OptimizeResult;
use crate::optimize::minimize::{LocalMethod, local_problem};
use crate::optimize::sampling::{DEFAULT_PRNG_SEED, seeded_rng, uniform_point};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Options for [`MultiStart`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStartOptions {
    /// Consecutive non-improving starts after which the search stops
    pub max_no_improvement: usize,
    /// Local method run from each start
    pub local_method: LocalMethod,
    /// Seed of the random generator
    pub prng_seed: u64,
}

impl Default for MultiStartOptions {
    fn default() -> Self {
        Self {
            max_no_improvement: 10,
            local_method: LocalMethod::default(),
            prng_seed: DEFAULT_PRNG_SEED,
        }
    }
}

impl MultiStartOptions {
    /// Checks the options.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> OptimizeResult<()> {
        check_size("max_no_improvement", self.max_no_improvement, 1)
    }
}

/// Multi-start local search.
///
/// The first iteration searches from the initial values; every later one
/// from a uniform random point in the box. A start improves the search when
/// its minimum is lower than the best so far by more than the convergence
/// tolerance. The run succeeds after `max_no_improvement` consecutive starts
/// without improvement.
pub struct MultiStart {
    state: OptimizerState,
    bounds: Bounds,
    initial_values: Vec<f64>,
    options: MultiStartOptions,
}

impl MultiStart {
    /// Creates a multi-start search over `[lower, upper]`.
    ///
    /// # Errors
    /// * `DimensionMismatch` if a slice does not have `number_of_parameters` entries
    /// * `InvalidInterval` if any `upper[i] <= lower[i]`
    /// * `InvalidInput` if `initial_values` lie outside the bounds
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
            "MultiStart",
        )?;
        Ok(Self {
            state,
            bounds,
            initial_values: initial_values.to_vec(),
            options: MultiStartOptions::default(),
        })
    }

    /// Replaces the multi-start options.
    #[must_use]
    pub fn with_options(mut self, options: MultiStartOptions) -> Self {
        self.options = options;
        self
    }
}

impl Optimizable for MultiStart {
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
        let options = &self.options;
        let bounds = &self.bounds;
        let state = &mut self.state;
        let relative = state.settings().relative_tolerance;
        let absolute = state.settings().absolute_tolerance;

        let mut rng = seeded_rng(options.prng_seed);
        let mut best: Option<f64> = None;
        let mut no_improvement = 0;

        while state.next_iteration() {
            let start = if state.iterations() == 1 {
                self.initial_values.clone()
            } else {
                uniform_point(&mut rng, bounds)
            };

            let found = options
                .local_method
                .search(state, bounds, &start, relative, absolute)?;
            let improves = best.is_none_or(|b: f64| {
                found.fitness < b && !state.check_convergence(b, found.fitness)
            });
            if best.is_none_or(|b| found.fitness < b) {
                best = Some(found.fitness);
            }

            if improves {
                no_improvement = 0;
            } else {
                no_improvement += 1;
                if no_improvement >= options.max_no_improvement {
                    tracing::debug!(
                        starts = state.iterations(),
                        best = ?best,
                        "multi-start stopped improving"
                    );
                    return Ok(OptimizationStatus::Success);
                }
            }
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::error::OptimizeError;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|&xi| xi * xi).sum()
    }

    /// Double well with the deeper minimum near x = -1.
    fn tilted_double_well(x: &[f64]) -> f64 {
        (x[0] * x[0] - 1.0).powi(2) + 0.3 * x[0]
    }

    #[test]
    fn test_multi_start_sphere() {
        let mut ms = MultiStart::new(sphere, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        let status = ms.minimize().expect("MultiStart failed");

        assert_eq!(status, OptimizationStatus::Success);
        // one improving start plus ten that do not improve
        assert_eq!(ms.iterations(), 11);
        assert!(ms.best_parameter_set().unwrap().fitness < 1e-8);
    }

    #[test]
    fn test_multi_start_finds_deeper_well() {
        let mut ms = MultiStart::new(tilted_double_well, 1, &[1.0], &[-2.0], &[2.0])
            .unwrap()
            .with_options(MultiStartOptions {
                local_method: LocalMethod::NelderMead,
                ..Default::default()
            });
        ms.minimize().expect("MultiStart failed");

        assert!(ms.best_parameter_set().unwrap().values[0] < -0.9);
    }

    #[test]
    fn test_multi_start_maximize() {
        let mut ms =
            MultiStart::new(|x: &[f64]| 4.0 - (x[0] - 1.0).powi(2), 1, &[0.0], &[-3.0], &[3.0])
                .unwrap();
        ms.maximize().expect("MultiStart failed");

        let best = ms.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 1e-4);
        assert!((best.fitness - 4.0).abs() < 1e-8);
    }

    #[test]
    fn test_multi_start_propagates_local_failure() {
        // NaN to the right of the start breaks the finite-difference line search
        let cliff = |x: &[f64]| if x[0] > 0.0 { f64::NAN } else { x[0] * x[0] };
        let mut ms = MultiStart::new(cliff, 1, &[0.0], &[-1.0], &[1.0]).unwrap();

        assert!(matches!(ms.minimize(), Err(OptimizeError::NumericalError { .. })));
        assert_eq!(ms.status(), OptimizationStatus::Failure);
        assert!(ms.function_evaluations() > 0);
    }

    #[test]
    fn test_multi_start_traces_every_evaluation() {
        let mut ms = MultiStart::new(sphere, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        ms.settings_mut().record_traces = true;
        ms.minimize().expect("MultiStart failed");

        assert_eq!(ms.parameter_set_trace().len(), ms.function_evaluations());
        let lowest = ms
            .parameter_set_trace()
            .iter()
            .map(|set| set.fitness)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(ms.best_parameter_set().unwrap().fitness, lowest);
    }

    #[test]
    fn test_multi_start_rejects_zero_patience() {
        let mut ms = MultiStart::new(sphere, 1, &[0.5], &[-1.0], &[1.0])
            .unwrap()
            .with_options(MultiStartOptions {
                max_no_improvement: 0,
                ..Default::default()
            });
        assert!(matches!(ms.minimize(), Err(OptimizeError::InvalidParameter { .. })));
    }
}
