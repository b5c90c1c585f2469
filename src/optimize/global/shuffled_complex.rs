//! Shuffled Complex Evolution (SCE-UA) global optimizer.

#![allow(clippy::needless_range_loop)]

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_size, evaluate_all, global_problem};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::OptimizeResult;
use crate::optimize::parameter_set::{ParameterSet, sort_by_fitness};
use crate::optimize::sampling::{DEFAULT_PRNG_SEED, latin_hypercube, seeded_rng};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Cap on evolution steps per drawn sub-complex.
const MAX_ALPHA: usize = 3;

/// Options for [`ShuffledComplexEvolution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuffledComplexEvolutionOptions {
    /// Number of complexes
    pub complexes: usize,
    /// Points per complex, also the number of evolution steps per complex
    /// between shuffles; `None` uses `2D + 1`
    pub cce_iterations: Option<usize>,
    /// Consecutive converged iterations required to stop
    pub tolerance_steps: usize,
    /// Seed of the random generator
    pub prng_seed: u64,
}

impl Default for ShuffledComplexEvolutionOptions {
    fn default() -> Self {
        Self {
            complexes: 5,
            cce_iterations: None,
            tolerance_steps: 10,
            prng_seed: DEFAULT_PRNG_SEED,
        }
    }
}

impl ShuffledComplexEvolutionOptions {
    /// Checks the options for a problem of `number_of_parameters` dimensions.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self, number_of_parameters: usize) -> OptimizeResult<()> {
        check_size("complexes", self.complexes, 1)?;
        check_size(
            "cce_iterations",
            self.complex_size(number_of_parameters),
            number_of_parameters + 1,
        )?;
        check_size("tolerance_steps", self.tolerance_steps, 1)
    }

    fn complex_size(&self, number_of_parameters: usize) -> usize {
        self.cce_iterations
            .unwrap_or(2 * number_of_parameters + 1)
    }
}

/// Shuffled Complex Evolution (Duan, Sorooshian & Gupta).
///
/// # Note
/// The population is sorted and dealt into complexes by striding, so every
/// complex holds a mix of good and poor points. Each complex evolves by
/// competitive complex evolution: a sub-complex of `D + 1` points is drawn
/// with triangular probabilities favoring better points, and its worst
/// point is reflected through the centroid of the others. A failed
/// reflection is replaced by a contraction, and a failed contraction by a
/// random point in the complex's bounding box. Complexes are then shuffled
/// back into one population.
///
/// A reflection that leaves the box is not clamped: it is replaced by a
/// random point in the complex's bounding box, which lies inside the box
/// since every complex member does.
///
/// The number of evolution steps per drawn sub-complex starts at 1 and grows
/// with consecutive non-improving iterations, up to 3. The run converges
/// once the best fitness has met the convergence predicate for
/// `tolerance_steps` consecutive iterations.
pub struct ShuffledComplexEvolution {
    state: OptimizerState,
    bounds: Bounds,
    options: ShuffledComplexEvolutionOptions,
}

impl ShuffledComplexEvolution {
    /// Creates an SCE-UA search over `[lower, upper]`.
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
            "ShuffledComplexEvolution",
        )?;
        Ok(Self {
            state,
            bounds,
            options: ShuffledComplexEvolutionOptions::default(),
        })
    }

    /// Replaces the evolution options.
    #[must_use]
    pub fn with_options(mut self, options: ShuffledComplexEvolutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Draws `count` distinct ranks out of `size` with probability
/// `2 (size - i) / (size (size + 1))` for rank `i`, returned in rank order.
fn select_subcomplex<R: Rng>(rng: &mut R, size: usize, count: usize) -> Vec<usize> {
    let total = (size * (size + 1)) as f64;
    let mut picked: Vec<usize> = Vec::with_capacity(count);
    while picked.len() < count {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        let mut rank = size - 1;
        for i in 0..size {
            cumulative += 2.0 * (size - i) as f64 / total;
            if u < cumulative {
                rank = i;
                break;
            }
        }
        if !picked.contains(&rank) {
            picked.push(rank);
        }
    }
    picked.sort_unstable();
    picked
}

/// Uniform point inside the bounding box of `points`.
fn random_in_hull<R: Rng>(rng: &mut R, points: &[ParameterSet]) -> Vec<f64> {
    let n = points[0].values.len();
    (0..n)
        .map(|j| {
            let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.values[j]), hi.max(p.values[j]))
            });
            lo + rng.random::<f64>() * (hi - lo)
        })
        .collect()
}

/// One competitive evolution step on a sorted sub-complex: replaces its
/// worst member.
fn evolve_subcomplex<R: Rng>(
    state: &mut OptimizerState,
    bounds: &Bounds,
    rng: &mut R,
    complex: &[ParameterSet],
    subcomplex: &mut [ParameterSet],
) -> OptimizeResult<()> {
    let q = subcomplex.len();
    let n = bounds.len();
    let worst = subcomplex[q - 1].clone();

    let mut centroid = vec![0.0; n];
    for member in &subcomplex[..q - 1] {
        for j in 0..n {
            centroid[j] += member.values[j] / (q - 1) as f64;
        }
    }

    // Reflection, or a random point when it leaves the box
    let mut candidate: Vec<f64> = (0..n)
        .map(|j| 2.0 * centroid[j] - worst.values[j])
        .collect();
    if !bounds.contains(&candidate) {
        candidate = random_in_hull(rng, complex);
    }
    let mut fitness = state.evaluate(&candidate)?;

    if fitness >= worst.fitness {
        // Contraction halfway to the centroid
        candidate = (0..n)
            .map(|j| 0.5 * (centroid[j] + worst.values[j]))
            .collect();
        fitness = state.evaluate(&candidate)?;

        if fitness >= worst.fitness {
            candidate = random_in_hull(rng, complex);
            fitness = state.evaluate(&candidate)?;
        }
    }

    subcomplex[q - 1] = ParameterSet::new(&candidate, fitness);
    sort_by_fitness(subcomplex);
    Ok(())
}

impl Optimizable for ShuffledComplexEvolution {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        let n = self.bounds.len();
        self.options.validate(n)?;
        let options = &self.options;
        let bounds = &self.bounds;
        let state = &mut self.state;

        let p = options.complexes;
        let m = options.complex_size(n);
        let q = n + 1;

        let mut rng = seeded_rng(options.prng_seed);
        let points = latin_hypercube(&mut rng, bounds, p * m);
        let mut population = evaluate_all(state, points)?;
        sort_by_fitness(&mut population);

        let mut converged_steps = 0;
        let mut no_improvement = 0;

        while state.next_iteration() {
            let old_best = population[0].fitness;
            let alpha = (1 + no_improvement).min(MAX_ALPHA);

            let mut complexes: Vec<Vec<ParameterSet>> = (0..p)
                .map(|k| (0..m).map(|j| population[k + p * j].clone()).collect())
                .collect();

            for complex in &mut complexes {
                for _ in 0..m {
                    let ranks = select_subcomplex(&mut rng, m, q);
                    let mut subcomplex: Vec<ParameterSet> =
                        ranks.iter().map(|&r| complex[r].clone()).collect();

                    for _ in 0..alpha {
                        evolve_subcomplex(state, bounds, &mut rng, complex, &mut subcomplex)?;
                    }

                    for (&r, member) in ranks.iter().zip(subcomplex) {
                        complex[r] = member;
                    }
                    sort_by_fitness(complex);
                }
            }

            // Shuffle
            population = complexes.into_iter().flatten().collect();
            sort_by_fitness(&mut population);
            let new_best = population[0].fitness;
            tracing::debug!(
                iteration = state.iterations(),
                best = new_best,
                alpha,
                "complexes shuffled"
            );

            if new_best < old_best {
                no_improvement = 0;
            } else {
                no_improvement += 1;
            }

            if state.check_convergence(old_best, new_best) {
                converged_steps += 1;
                if converged_steps >= options.tolerance_steps {
                    return Ok(OptimizationStatus::Success);
                }
            } else {
                converged_steps = 0;
            }
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}
