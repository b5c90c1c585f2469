//! Differential Evolution global optimizer.

#![allow(clippy::needless_range_loop)]

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_probability, check_size, evaluate_all, global_problem, spread_converged};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::sampling::{DEFAULT_PRNG_SEED, latin_hypercube, seeded_rng};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Options for [`DifferentialEvolution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialEvolutionOptions {
    /// Population size; `None` uses `max(10 * D, 4)`
    pub population_size: Option<usize>,
    /// Seed of the random generator
    pub prng_seed: u64,
    /// Fixed mutation factor, in `[0, 2]`
    pub mutation: f64,
    /// Probability of drawing the mutation factor from `U[0.5, 1]` instead
    pub dither_rate: f64,
    /// Per-dimension crossover probability
    pub crossover_probability: f64,
}

impl Default for DifferentialEvolutionOptions {
    fn default() -> Self {
        Self {
            population_size: None,
            prng_seed: DEFAULT_PRNG_SEED,
            mutation: 0.75,
            dither_rate: 0.5,
            crossover_probability: 0.9,
        }
    }
}

impl DifferentialEvolutionOptions {
    /// Checks the options.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> OptimizeResult<()> {
        if let Some(size) = self.population_size {
            check_size("population_size", size, 4)?;
        }
        if !(0.0..=2.0).contains(&self.mutation) {
            return Err(OptimizeError::invalid_parameter(
                "mutation",
                format!("must lie in [0, 2], got {}", self.mutation),
            ));
        }
        check_probability("dither_rate", self.dither_rate)?;
        check_probability("crossover_probability", self.crossover_probability)
    }

    fn population_size_for(&self, number_of_parameters: usize) -> usize {
        self.population_size
            .unwrap_or_else(|| (10 * number_of_parameters).max(4))
    }
}

/// Differential Evolution global optimizer (rand/1/bin).
///
/// # Note
/// DE is a population-based stochastic optimizer that works well for
/// non-smooth, non-convex functions. It doesn't require gradients.
/// For each member, three other distinct members form a mutant
/// `x_r1 + F * (x_r2 - x_r3)`, where `F` is drawn from `U[0.5, 1]` with
/// probability `dither_rate` and is `mutation` otherwise. Binomial crossover
/// with one forced gene builds the trial, which replaces the member when it
/// is not worse. Converges when the standard deviation of the population
/// fitness falls within tolerance.
pub struct DifferentialEvolution {
    state: OptimizerState,
    bounds: Bounds,
    options: DifferentialEvolutionOptions,
}

impl DifferentialEvolution {
    /// Creates a differential evolution search over `[lower, upper]`.
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
            "DifferentialEvolution",
        )?;
        Ok(Self {
            state,
            bounds,
            options: DifferentialEvolutionOptions::default(),
        })
    }

    /// Replaces the evolution options.
    #[must_use]
    pub fn with_options(mut self, options: DifferentialEvolutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Three distinct indices in `0..size`, all different from `exclude`.
fn distinct_others<R: Rng>(rng: &mut R, size: usize, exclude: usize) -> [usize; 3] {
    let mut picked = [exclude; 3];
    for k in 0..3 {
        loop {
            let candidate = rng.random_range(0..size);
            if candidate != exclude && !picked[..k].contains(&candidate) {
                picked[k] = candidate;
                break;
            }
        }
    }
    picked
}

impl Optimizable for DifferentialEvolution {
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
        let size = options.population_size_for(n);

        let mut rng = seeded_rng(options.prng_seed);
        let points = latin_hypercube(&mut rng, bounds, size);
        let mut population = evaluate_all(state, points)?;

        while state.next_iteration() {
            for i in 0..size {
                let [r1, r2, r3] = distinct_others(&mut rng, size, i);
                let scale = if rng.random::<f64>() < options.dither_rate {
                    rng.random_range(0.5..=1.0)
                } else {
                    options.mutation
                };

                // Binomial crossover with one forced gene
                let forced = rng.random_range(0..n);
                let mut trial = population[i].values.clone();
                for j in 0..n {
                    if j == forced || rng.random::<f64>() < options.crossover_probability {
                        let mutant = population[r1].values[j]
                            + scale * (population[r2].values[j] - population[r3].values[j]);
                        trial[j] = bounds.repair_at(j, mutant);
                    }
                }

                // Greedy selection
                let fitness = state.evaluate(&trial)?;
                if fitness <= population[i].fitness {
                    population[i] = ParameterSet::new(&trial, fitness);
                }
            }

            let fitness: Vec<f64> = population.iter().map(|p| p.fitness).collect();
            if spread_converged(state, &fitness) {
                tracing::debug!(
                    iterations = state.iterations(),
                    "differential evolution converged"
                );
                return Ok(OptimizationStatus::Success);
            }
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rastrigin(x: &[f64]) -> f64 {
        let a = 10.0;
        let n = x.len() as f64;
        a * n
            + x.iter()
                .map(|&xi| xi * xi - a * (2.0 * std::f64::consts::PI * xi).cos())
                .sum::<f64>()
    }

    fn rosenbrock(x: &[f64]) -> f64 {
        let mut sum = 0.0;
        for i in 0..x.len() - 1 {
            sum += 100.0 * (x[i + 1] - x[i] * x[i]).powi(2) + (1.0 - x[i]).powi(2);
        }
        sum
    }

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|&xi| xi * xi).sum()
    }

    #[test]
    fn test_distinct_others() {
        let mut rng = seeded_rng(1);
        for exclude in 0..4 {
            let [a, b, c] = distinct_others(&mut rng, 4, exclude);
            assert!(a != b && b != c && a != c);
            assert!(![a, b, c].contains(&exclude));
        }
    }

    #[test]
    fn test_de_sphere() {
        let mut de = DifferentialEvolution::new(sphere, 2, &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        let status = de.minimize().expect("DE failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = de.best_parameter_set().unwrap();
        assert!(best.fitness < 1e-6);
        for xi in &best.values {
            assert!(xi.abs() < 0.01);
        }
    }

    #[test]
    fn test_de_rastrigin() {
        let mut de = DifferentialEvolution::new(rastrigin, 2, &[-5.12, -5.12], &[5.12, 5.12])
            .unwrap()
            .with_options(DifferentialEvolutionOptions {
                population_size: Some(40),
                ..Default::default()
            });
        de.settings_mut().max_iterations = 500;
        de.minimize().expect("DE failed");

        assert!(de.best_parameter_set().unwrap().fitness < 1.5);
    }

    #[test]
    fn test_de_rosenbrock() {
        let mut de =
            DifferentialEvolution::new(rosenbrock, 2, &[-2.0, -2.0], &[2.0, 2.0]).unwrap();
        de.settings_mut().max_iterations = 2000;
        de.minimize().expect("DE failed");

        let best = de.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 0.01);
        assert!((best.values[1] - 1.0).abs() < 0.02);
    }

    #[test]
    fn test_de_rejects_mutation_out_of_range() {
        let mut de = DifferentialEvolution::new(sphere, 2, &[-5.0, -5.0], &[5.0, 5.0])
            .unwrap()
            .with_options(DifferentialEvolutionOptions {
                mutation: 2.5,
                ..Default::default()
            });
        assert!(matches!(de.minimize(), Err(OptimizeError::InvalidParameter { .. })));
    }

    #[test]
    fn test_de_deterministic() {
        let run = |seed: u64| {
            let mut de = DifferentialEvolution::new(rastrigin, 2, &[-5.12, -5.12], &[5.12, 5.12])
                .unwrap()
                .with_options(DifferentialEvolutionOptions {
                    prng_seed: seed,
                    ..Default::default()
                });
            de.settings_mut().max_iterations = 30;
            de.minimize().unwrap();
            de.best_parameter_set().unwrap().clone()
        };
        assert_eq!(run(7), run(7));
    }
}
