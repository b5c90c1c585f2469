//! Particle swarm global optimizer.

#![allow(clippy::needless_range_loop)]

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_size, evaluate_all, global_problem, spread_converged};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::sampling::{DEFAULT_PRNG_SEED, latin_hypercube, seeded_rng};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Iterations before the spread test may stop the swarm.
const MIN_ITERATIONS_BEFORE_CONVERGENCE: usize = 10;

/// Options for [`ParticleSwarm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSwarmOptions {
    /// Number of particles
    pub population_size: usize,
    /// Seed of the random generator
    pub prng_seed: u64,
    /// Inertia weight at the first iteration
    pub inertia_max: f64,
    /// Inertia weight at `max_iterations`
    pub inertia_min: f64,
    /// Pull toward each particle's personal best
    pub cognitive: f64,
    /// Pull toward the swarm's best
    pub social: f64,
    /// Scale the whole update by Clerc's constriction factor
    pub constricted: bool,
}

impl Default for ParticleSwarmOptions {
    fn default() -> Self {
        Self {
            population_size: 30,
            prng_seed: DEFAULT_PRNG_SEED,
            inertia_max: 0.9,
            inertia_min: 0.4,
            cognitive: 2.05,
            social: 2.05,
            constricted: false,
        }
    }
}

impl ParticleSwarmOptions {
    /// Checks the options.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> OptimizeResult<()> {
        check_size("population_size", self.population_size, 2)?;
        let inertia_ordered = self.inertia_min >= 0.0
            && self.inertia_min <= self.inertia_max
            && self.inertia_max <= 1.0;
        if !inertia_ordered {
            return Err(OptimizeError::invalid_parameter(
                "inertia_max",
                "inertia weights must satisfy 0 <= inertia_min <= inertia_max <= 1",
            ));
        }
        if !(self.cognitive >= 0.0 && self.social >= 0.0 && self.cognitive + self.social > 0.0) {
            return Err(OptimizeError::invalid_parameter(
                "cognitive",
                "acceleration coefficients must be non-negative and not both zero",
            ));
        }
        Ok(())
    }

    /// Clerc's constriction factor when `constricted` is set and
    /// `phi = cognitive + social > 4`, else 1.
    fn constriction(&self) -> f64 {
        let phi = self.cognitive + self.social;
        if self.constricted && phi > 4.0 {
            2.0 / (2.0 - phi - (phi * phi - 4.0 * phi).sqrt()).abs()
        } else {
            1.0
        }
    }
}

/// Particle swarm optimization.
///
/// Particles start on a Latin hypercube with zero velocity. Each iteration
/// blends inertia, a pull toward the particle's personal best and a pull
/// toward the swarm's best. The inertia weight decays linearly from
/// `inertia_max` to `inertia_min` over `max_iterations`. Velocities are
/// clamped to the box width and positions are clamped into the box. With
/// `constricted` set, the update is scaled by Clerc's constriction factor
/// (≈ 0.7298 for coefficients summing to 4.1).
///
/// Converges when the standard deviation of the personal-best fitness falls
/// within tolerance, checked from iteration 10 on.
pub struct ParticleSwarm {
    state: OptimizerState,
    bounds: Bounds,
    options: ParticleSwarmOptions,
}

impl ParticleSwarm {
    /// Creates a particle swarm search over `[lower, upper]`.
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
        let (state, bounds) =
            global_problem(objective, number_of_parameters, lower, upper, "ParticleSwarm")?;
        Ok(Self {
            state,
            bounds,
            options: ParticleSwarmOptions::default(),
        })
    }

    /// Replaces the swarm options.
    #[must_use]
    pub fn with_options(mut self, options: ParticleSwarmOptions) -> Self {
        self.options = options;
        self
    }
}

impl Optimizable for ParticleSwarm {
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
        let chi = options.constriction();
        let max_iterations = state.settings().max_iterations as f64;

        let mut rng = seeded_rng(options.prng_seed);
        let points = latin_hypercube(&mut rng, bounds, options.population_size);
        let mut particles = evaluate_all(state, points)?;
        let mut personal_best = particles.clone();
        let mut velocities = vec![vec![0.0; n]; particles.len()];

        let mut global_best = 0;
        for (i, set) in personal_best.iter().enumerate() {
            if set.fitness < personal_best[global_best].fitness {
                global_best = i;
            }
        }

        while state.next_iteration() {
            let iteration = state.iterations();
            let progress = (iteration - 1) as f64 / max_iterations;
            let w = options.inertia_max - (options.inertia_max - options.inertia_min) * progress;

            for i in 0..particles.len() {
                let leader = personal_best[global_best].values.clone();
                let mut position = particles[i].values.clone();

                for j in 0..n {
                    let r1: f64 = rng.random();
                    let r2: f64 = rng.random();
                    let x = position[j];
                    let v = chi
                        * (w * velocities[i][j]
                            + options.cognitive * r1 * (personal_best[i].values[j] - x)
                            + options.social * r2 * (leader[j] - x));
                    let v_max = bounds.range(j);
                    velocities[i][j] = v.clamp(-v_max, v_max);
                    position[j] = bounds.repair_at(j, x + velocities[i][j]);
                }

                let fitness = state.evaluate(&position)?;
                particles[i] = ParameterSet::new(&position, fitness);
                if fitness < personal_best[i].fitness {
                    personal_best[i] = ParameterSet::new(&position, fitness);
                    if fitness < personal_best[global_best].fitness {
                        global_best = i;
                    }
                }
            }

            if iteration >= MIN_ITERATIONS_BEFORE_CONVERGENCE {
                let fitness: Vec<f64> = personal_best.iter().map(|p| p.fitness).collect();
                if spread_converged(state, &fitness) {
                    tracing::debug!(
                        iterations = iteration,
                        fitness = personal_best[global_best].fitness,
                        "particle swarm converged"
                    );
                    return Ok(OptimizationStatus::Success);
                }
            }
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}
