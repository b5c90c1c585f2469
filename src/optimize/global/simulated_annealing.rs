//! Simulated annealing global optimizer.

#![allow(clippy::needless_range_loop)]

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_size, global_problem};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::sampling::{DEFAULT_PRNG_SEED, seeded_rng, uniform_point};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Acceptance ratio above which a step grows.
const HIGH_ACCEPTANCE: f64 = 0.6;
/// Acceptance ratio below which a step shrinks.
const LOW_ACCEPTANCE: f64 = 0.4;

/// Options for [`SimulatedAnnealing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedAnnealingOptions {
    /// Seed of the random generator
    pub prng_seed: u64,
    /// Temperature at the first level
    pub initial_temperature: f64,
    /// Floor of the cooling schedule
    pub min_temperature: f64,
    /// Sweeps over all dimensions between step adjustments
    pub update_cycles: usize,
    /// Step adjustments per temperature level
    pub temperature_cycles: usize,
    /// Step variation factor `c` of the Corana update
    pub step_adjustment: f64,
}

impl Default for SimulatedAnnealingOptions {
    fn default() -> Self {
        Self {
            prng_seed: DEFAULT_PRNG_SEED,
            initial_temperature: 10.0,
            min_temperature: 1e-4,
            update_cycles: 20,
            temperature_cycles: 5,
            step_adjustment: 2.0,
        }
    }
}

impl SimulatedAnnealingOptions {
    /// Checks the options.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !(self.min_temperature > 0.0) {
            return Err(OptimizeError::invalid_parameter(
                "min_temperature",
                format!("must be positive, got {}", self.min_temperature),
            ));
        }
        if !(self.initial_temperature >= self.min_temperature && self.initial_temperature.is_finite())
        {
            return Err(OptimizeError::invalid_parameter(
                "initial_temperature",
                "must be finite and at least min_temperature",
            ));
        }
        check_size("update_cycles", self.update_cycles, 1)?;
        check_size("temperature_cycles", self.temperature_cycles, 1)?;
        if !(self.step_adjustment > 0.0) {
            return Err(OptimizeError::invalid_parameter(
                "step_adjustment",
                format!("must be positive, got {}", self.step_adjustment),
            ));
        }
        Ok(())
    }

    /// Logarithmic schedule `max(T_min, T_0 / ln(k + e - 1))` for level `k >= 1`.
    fn temperature(&self, level: usize) -> f64 {
        let t = self.initial_temperature / (level as f64 + std::f64::consts::E - 1.0).ln();
        t.max(self.min_temperature)
    }

    /// Corana step update for one dimension, capped at the box width.
    fn adjust_step(&self, step: f64, acceptance: f64, width: f64) -> f64 {
        let c = self.step_adjustment;
        let step = if acceptance > HIGH_ACCEPTANCE {
            step * (1.0 + c * (acceptance - HIGH_ACCEPTANCE) / LOW_ACCEPTANCE)
        } else if acceptance < LOW_ACCEPTANCE {
            step / (1.0 + c * (LOW_ACCEPTANCE - acceptance) / LOW_ACCEPTANCE)
        } else {
            step
        };
        step.min(width)
    }
}

/// Simulated annealing global optimizer with Corana adaptive steps.
///
/// # Note
/// Simulated annealing is inspired by the annealing process in metallurgy.
/// It gradually reduces "temperature" to settle into a global minimum.
///
/// Each iteration is one temperature level. Within a level, the current
/// point is perturbed one coordinate at a time by a uniform draw in
/// `±step[i]` and the move is accepted by the Metropolis rule. After every
/// `update_cycles` sweeps the per-dimension steps are rescaled toward a 50%
/// acceptance rate. Steps start at half the box width.
///
/// There is no convergence test: a run ends on `max_iterations`
/// (`MaximumIterationsReached`) or on the evaluation budget.
pub struct SimulatedAnnealing {
    state: OptimizerState,
    bounds: Bounds,
    options: SimulatedAnnealingOptions,
}

impl SimulatedAnnealing {
    /// Creates an annealing search over `[lower, upper]`.
    ///
    /// # Errors
    /// * `DimensionMismatch` if a bound slice does not have `number_of_parameters` entries
    /// * `InvalidInterval` if any `upper[i] <= lower[i]`
    pub fn new<F>(
        objective: F,
        number_of_parameters: usize,
        lower: &[f64],
        upper: &[f64],
    ) -> OptimizeResult<Self>
    where
        F: Fn(&[f64]) -> f64 + 'static,
    {
        let (state, bounds) = global_problem(
            objective,
            number_of_parameters,
            lower,
            upper,
            "SimulatedAnnealing",
        )?;
        Ok(Self {
            state,
            bounds,
            options: SimulatedAnnealingOptions::default(),
        })
    }

    /// Replaces the annealing options.
    #[must_use]
    pub fn with_options(mut self, options: SimulatedAnnealingOptions) -> Self {
        self.options = options;
        self
    }
}

impl Optimizable for SimulatedAnnealing {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        self.options.validate()?;
        let options = &self.options;
        let bounds = &self.bounds;
        let state = &mut self.state;
        let n = bounds.len();

        let mut rng = seeded_rng(options.prng_seed);
        let mut current = uniform_point(&mut rng, bounds);
        let mut f_current = state.evaluate(&current)?;
        let mut steps: Vec<f64> = (0..n).map(|i| 0.5 * bounds.range(i)).collect();
        let mut accepted = vec![0usize; n];

        while state.next_iteration() {
            let temperature = options.temperature(state.iterations());

            for _ in 0..options.temperature_cycles {
                accepted.fill(0);

                for _ in 0..options.update_cycles {
                    for h in 0..n {
                        let mut candidate = current.clone();
                        let offset = (2.0 * rng.random::<f64>() - 1.0) * steps[h];
                        candidate[h] = bounds.repair_at(h, current[h] + offset);

                        let f_candidate = state.evaluate(&candidate)?;
                        let delta = f_candidate - f_current;
                        let metropolis = rng.random::<f64>();
                        if delta < 0.0 || (-delta / temperature).exp() > metropolis {
                            current = candidate;
                            f_current = f_candidate;
                            accepted[h] += 1;
                        }
                    }
                }

                for h in 0..n {
                    let acceptance = accepted[h] as f64 / options.update_cycles as f64;
                    steps[h] = options.adjust_step(steps[h], acceptance, bounds.range(h));
                }
            }

            tracing::debug!(
                level = state.iterations(),
                temperature,
                fitness = f_current,
                "annealing temperature level finished"
            );
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|&xi| xi * xi).sum()
    }

    #[test]
    fn test_temperature_schedule() {
        let options = SimulatedAnnealingOptions::default();
        assert_relative_eq!(options.temperature(1), 10.0, epsilon = 1e-12);
        assert!(options.temperature(10) < options.temperature(2));

        let floor = SimulatedAnnealingOptions {
            initial_temperature: 1e-3,
            ..Default::default()
        };
        assert_eq!(floor.temperature(1_000_000), 1e-4);
    }

    #[test]
    fn test_adjust_step() {
        let options = SimulatedAnnealingOptions::default();
        // 100% acceptance: 1 + 2 * 0.4 / 0.4 = 3
        assert_relative_eq!(options.adjust_step(1.0, 1.0, 10.0), 3.0, epsilon = 1e-12);
        // 0% acceptance: divide by 3
        assert_relative_eq!(options.adjust_step(1.0, 0.0, 10.0), 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(options.adjust_step(1.0, 0.5, 10.0), 1.0);
        assert_eq!(options.adjust_step(8.0, 1.0, 10.0), 10.0);
    }

    #[test]
    fn test_sa_sphere() {
        let mut sa = SimulatedAnnealing::new(sphere, 2, &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        sa.settings_mut().max_iterations = 200;
        let status = sa.minimize().expect("SA failed");

        assert_eq!(status, OptimizationStatus::MaximumIterationsReached);
        assert_eq!(sa.iterations(), 200);
        // 1 start + 200 levels * 5 * 20 sweeps * 2 dimensions
        assert_eq!(sa.function_evaluations(), 1 + 200 * 5 * 20 * 2);
        assert!(sa.best_parameter_set().unwrap().fitness < 0.1);
    }

    #[test]
    fn test_sa_stops_on_evaluation_budget() {
        let mut sa = SimulatedAnnealing::new(sphere, 2, &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        sa.settings_mut().max_function_evaluations = 500;
        let status = sa.minimize().expect("SA failed");

        assert_eq!(status, OptimizationStatus::MaximumFunctionEvaluationsReached);
        assert_eq!(sa.function_evaluations(), 500);
    }

    #[test]
    fn test_sa_deterministic() {
        let run = || {
            let mut sa = SimulatedAnnealing::new(sphere, 3, &[-5.0; 3], &[5.0; 3]).unwrap();
            sa.settings_mut().max_iterations = 10;
            sa.minimize().unwrap();
            sa.best_parameter_set().unwrap().clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_sa_rejects_bad_temperature() {
        let mut sa = SimulatedAnnealing::new(sphere, 1, &[-1.0], &[1.0])
            .unwrap()
            .with_options(SimulatedAnnealingOptions {
                min_temperature: 0.0,
                ..Default::default()
            });
        assert!(matches!(sa.minimize(), Err(OptimizeError::InvalidParameter { .. })));
    }
}
